pub mod error;
pub mod flush;
pub mod placement;
pub mod storage;

pub use error::{FlushError, LockResultExt};
pub use flush::{
    FlushOutcome, FlushReport, FlushSummary, FlushTarget, RegionId, ServerId, TableName,
};
pub use placement::{PlacementService, PlacementSnapshot};
pub use storage::{SegmentHandle, SegmentWriter, WriteAheadLog};
