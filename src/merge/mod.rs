//! Merging of incremental (`@defer` / `@stream`) response payloads.
//!
//! A deferred response arrives as a sequence of payloads: an initial result with
//! `hasNext: true`, then follow-ups whose `incremental` arrays carry patches. The
//! transport hands payloads to the caller in batches, one batch per network read.
//! [`assemble`] turns a batch into the flat, ordered list the caller's store applies,
//! and marks the last payload of the response so the store knows when to commit.
//!
//! | Input payload | Output |
//! |---------------|--------|
//! | `{data, hasNext: true}` | kept as is |
//! | `{incremental: [p1, p2], hasNext}` | `p1, p2` spliced in place |
//! | `{data}` (no `hasNext`) | kept, batch becomes final |
//!
//! The marker is `extensions.is_final = true` on the last flattened payload of a
//! final batch. Downstream commit logic keys off this exact key and position.

mod assemble;

pub use assemble::assemble;
