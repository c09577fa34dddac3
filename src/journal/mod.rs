//! Append-only journal backing the read model.
//!
//! Every mutation is framed as `[len u32][msgpack entry][crc32 u32]` and
//! appended before the in-memory tables change. Opening the journal returns
//! the entries to replay; a torn trailing frame is cut off.

mod entry;
mod log;

pub use entry::{JournalEntry, JournalOp};
pub use log::Journal;
