pub mod block;
pub mod varint;

pub use block::{block_count, RawInts, SyncBlocks, BLOCK_SIZE};
pub use varint::{VarInt, MAX_VARINT_LEN};
