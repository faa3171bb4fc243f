//! Filesystem-backed segment writer.
//!
//! Segments are JSON files under `{root}/{table}/{region}/{seq:016x}.json`,
//! fsynced before the handle is returned. Read-back helpers exist so tests
//! and tools can verify what a flush persisted; the read path proper is out
//! of scope here.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::contracts::{FlushError, RegionId, SegmentHandle, SegmentWriter, TableName};
use crate::memstore::MemStoreSnapshot;
use crate::storage::is_retryable_io_error;

/// One persisted cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCell {
    pub row: bytes::Bytes,
    pub column: bytes::Bytes,
    pub timestamp: u64,
    pub value: bytes::Bytes,
}

/// On-disk representation of a flushed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentFile {
    pub table: TableName,
    pub region: RegionId,
    pub max_seq: u64,
    pub cells: Vec<SegmentCell>,
}

/// Durable segment store rooted at a local directory.
pub struct FsSegmentWriter {
    root: PathBuf,
}

impl FsSegmentWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn region_dir(&self, table: &TableName, region: &RegionId) -> PathBuf {
        self.root.join(table.as_str()).join(region.as_str())
    }

    fn map_io(err: io::Error) -> FlushError {
        if is_retryable_io_error(&err) {
            FlushError::PersistFailure(err.to_string())
        } else {
            FlushError::Io(err.to_string())
        }
    }

    /// Lists the segments persisted for one region, ordered by sequence.
    pub fn list_segments(
        &self,
        table: &TableName,
        region: &RegionId,
    ) -> Result<Vec<SegmentHandle>, FlushError> {
        let dir = self.region_dir(table, region);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_io(e)),
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::map_io)?;
            let file = self.read_segment_path(&entry.path())?;
            let size = entry.metadata().map_err(Self::map_io)?.len();
            handles.push(SegmentHandle {
                segment_id: entry.path().display().to_string(),
                seq: file.max_seq,
                cell_count: file.cells.len(),
                size_bytes: size,
            });
        }
        handles.sort_by_key(|h| h.seq);
        Ok(handles)
    }

    /// Reads one segment file back for verification.
    pub fn read_segment(&self, handle: &SegmentHandle) -> Result<SegmentFile, FlushError> {
        self.read_segment_path(Path::new(&handle.segment_id))
    }

    fn read_segment_path(&self, path: &Path) -> Result<SegmentFile, FlushError> {
        let data = std::fs::read(path).map_err(Self::map_io)?;
        serde_json::from_slice(&data)
            .map_err(|e| FlushError::Io(format!("corrupt segment {}: {}", path.display(), e)))
    }
}

impl SegmentWriter for FsSegmentWriter {
    async fn write_segment(
        &self,
        table: &TableName,
        region: &RegionId,
        snapshot: &MemStoreSnapshot,
    ) -> Result<SegmentHandle, FlushError> {
        let file = SegmentFile {
            table: table.clone(),
            region: region.clone(),
            max_seq: snapshot.max_seq(),
            cells: snapshot
                .iter()
                .map(|(key, value)| SegmentCell {
                    row: key.row.clone(),
                    column: key.column.clone(),
                    timestamp: key.timestamp,
                    value: value.clone(),
                })
                .collect(),
        };
        let data = serde_json::to_vec(&file)
            .map_err(|e| FlushError::Io(format!("segment encode: {}", e)))?;

        let dir = self.region_dir(table, region);
        let path = dir.join(format!("{:016x}.json", snapshot.max_seq()));
        tokio::fs::create_dir_all(&dir).await.map_err(Self::map_io)?;

        // A retried persist of the same retained snapshot overwrites the
        // partial file from the failed attempt.
        let mut out = tokio::fs::File::create(&path).await.map_err(Self::map_io)?;
        out.write_all(&data).await.map_err(Self::map_io)?;
        out.sync_all().await.map_err(Self::map_io)?;

        tracing::debug!(
            table = %table,
            region = %region,
            seq = snapshot.max_seq(),
            bytes = data.len(),
            "segment written"
        );

        Ok(SegmentHandle {
            segment_id: path.display().to_string(),
            seq: snapshot.max_seq(),
            cell_count: file.cells.len(),
            size_bytes: data.len() as u64,
        })
    }
}
