mod fs_writer;
mod retry;
mod wal;

pub use fs_writer::{FsSegmentWriter, SegmentCell, SegmentFile};
pub use retry::is_retryable_io_error;
pub use wal::NoopWal;
