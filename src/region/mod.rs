//! Region: a contiguous key-range shard of a table, the unit of flush.
//!
//! `Region::flush` is the flush executor. A per-region async mutex serializes
//! flushes: a second request arriving mid-flush waits for the holder, then
//! re-evaluates whether a flush is still needed, so overlapping calls join
//! rather than racing a second swap. A swapped snapshot sits in the retained
//! slot until its segment is registered, so neither a failed persist nor a
//! caller dropping the flush future mid-write can lose cleared data; the next
//! flush writes the retained snapshot out first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::contracts::{
    FlushError, FlushOutcome, LockResultExt, RegionId, SegmentHandle, SegmentWriter, TableName,
    WriteAheadLog,
};
use crate::memstore::{CellKey, MemStore, MemStoreSnapshot};

/// Half-open row-key range `[start, end)`. An empty `end` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bytes,
    pub end: Bytes,
}

impl KeyRange {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The full key space.
    pub fn unbounded() -> Self {
        Self::new(Bytes::new(), Bytes::new())
    }

    pub fn contains(&self, row: &[u8]) -> bool {
        row >= self.start.as_ref() && (self.end.is_empty() || row < self.end.as_ref())
    }
}

/// A region: identity, key range, one active memstore, and the immutable
/// segments produced by prior flushes.
pub struct Region<W, L> {
    id: RegionId,
    table: TableName,
    range: KeyRange,
    memstore: MemStore,
    segments: RwLock<Vec<SegmentHandle>>,
    /// Snapshot of the in-flight or failed persist, flushed first on retry.
    retained: StdMutex<Option<Arc<MemStoreSnapshot>>>,
    /// Serializes flushes on this region; at most one in flight.
    flush_lock: Mutex<()>,
    seq: AtomicU64,
    writer: Arc<W>,
    wal: Arc<L>,
}

impl<W, L> Region<W, L>
where
    W: SegmentWriter,
    L: WriteAheadLog,
{
    pub fn new(
        id: impl Into<RegionId>,
        table: impl Into<TableName>,
        range: KeyRange,
        writer: Arc<W>,
        wal: Arc<L>,
    ) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
            range,
            memstore: MemStore::new(),
            segments: RwLock::new(Vec::new()),
            retained: StdMutex::new(None),
            flush_lock: Mutex::new(()),
            seq: AtomicU64::new(0),
            writer,
            wal,
        }
    }

    pub fn id(&self) -> &RegionId {
        &self.id
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    /// Writes one cell, returning its assigned sequence number.
    pub fn put(
        &self,
        row: impl Into<Bytes>,
        column: impl Into<Bytes>,
        timestamp: u64,
        value: impl Into<Bytes>,
    ) -> Result<u64, FlushError> {
        let row = row.into();
        if !self.range.contains(&row) {
            return Err(FlushError::InvalidInput(format!(
                "row out of range for region {}",
                self.id
            )));
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.memstore
            .append(seq, CellKey::new(row, column.into(), timestamp), value.into())?;
        Ok(seq)
    }

    /// Live-entry byte size of the active memstore. Zero from the swap
    /// instant onward, not merely from flush completion.
    pub fn memstore_size(&self) -> u64 {
        self.memstore.current_size()
    }

    pub fn memstore_cell_count(&self) -> Result<usize, FlushError> {
        self.memstore.cell_count()
    }

    /// Segments registered by completed flushes, oldest first.
    pub fn segments(&self) -> Result<Vec<SegmentHandle>, FlushError> {
        Ok(self.segments.read().map_lock_err()?.clone())
    }

    fn retained_snapshot(&self) -> Result<Option<Arc<MemStoreSnapshot>>, FlushError> {
        Ok(self
            .retained
            .lock()
            .map_err(|e| FlushError::LockPoisoned(e.to_string()))?
            .as_ref()
            .map(Arc::clone))
    }

    fn retain(&self, snapshot: Arc<MemStoreSnapshot>) -> Result<(), FlushError> {
        *self
            .retained
            .lock()
            .map_err(|e| FlushError::LockPoisoned(e.to_string()))? = Some(snapshot);
        Ok(())
    }

    fn clear_retained(&self) -> Result<(), FlushError> {
        self.retained
            .lock()
            .map_err(|e| FlushError::LockPoisoned(e.to_string()))?
            .take();
        Ok(())
    }

    /// True while a swapped snapshot awaits durable registration.
    pub fn has_retained_snapshot(&self) -> bool {
        self.retained
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    /// Persists one snapshot and registers the resulting segment. The
    /// snapshot stays in the retained slot until registration succeeds, so a
    /// write failure or a caller dropping the future mid-write leaves it
    /// recoverable by the next flush.
    async fn persist(&self, snapshot: &MemStoreSnapshot) -> Result<(), FlushError> {
        match self
            .writer
            .write_segment(&self.table, &self.id, snapshot)
            .await
        {
            Ok(handle) => {
                self.segments.write().map_lock_err()?.push(handle);
                // Log entries up to max_seq are now covered by a registered
                // segment; truncation failure is advisory, the data is safe.
                if let Err(e) = self.wal.flushed_up_to(&self.id, snapshot.max_seq()) {
                    tracing::warn!(region = %self.id, error = %e, "WAL low-water mark update failed");
                }
                self.clear_retained()?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    region = %self.id,
                    cells = snapshot.cell_count(),
                    error = %e,
                    "persist failed, snapshot stays retained"
                );
                Err(e)
            }
        }
    }

    /// Flushes this region's memstore to a new immutable segment.
    ///
    /// Empty memstore with nothing retained returns `Skipped` without taking
    /// a swap. A retained snapshot from a prior failed or abandoned persist
    /// is written before any new swap, so segments stay in sequence order.
    pub async fn flush(&self) -> Result<FlushOutcome, FlushError> {
        // Fast path, no lock: nothing buffered and nothing retained.
        if self.memstore.is_empty() && !self.has_retained_snapshot() {
            return Ok(FlushOutcome::Skipped);
        }

        let _guard = self.flush_lock.lock().await;

        let mut segments = 0usize;
        let mut bytes = 0u64;

        // Re-check under the lock: a joined flush may have drained everything.
        if let Some(snapshot) = self.retained_snapshot()? {
            self.persist(&snapshot).await?;
            segments += 1;
            bytes += snapshot.size_bytes();
        }

        if let Some(snapshot) = self.memstore.snapshot_and_clear()? {
            // Staged before the write starts: from here on the cleared cells
            // survive a persist failure and a dropped flush future alike.
            let snapshot = Arc::new(snapshot);
            self.retain(Arc::clone(&snapshot))?;
            self.persist(&snapshot).await?;
            segments += 1;
            bytes += snapshot.size_bytes();
        }

        if segments == 0 {
            return Ok(FlushOutcome::Skipped);
        }

        tracing::info!(
            region = %self.id,
            table = %self.table,
            segments,
            bytes,
            "flushed memstore"
        );
        Ok(FlushOutcome::Flushed { segments, bytes })
    }
}
