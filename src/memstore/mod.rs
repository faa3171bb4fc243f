//! In-region mutable sorted write buffer, the unit actually flushed.
//!
//! Appends and the snapshot swap synchronize on one `RwLock` around the cell
//! map, so an append lands either in the outgoing snapshot or in the fresh
//! buffer, never in neither. The tracked size is mutated only under the write
//! lock but read lock-free, and counts the active buffer only: observers see
//! size zero as soon as the swap happens, before the persist finishes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::contracts::{FlushError, LockResultExt};

/// Key of one memstore cell: (row, column, timestamp).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub row: Bytes,
    pub column: Bytes,
    pub timestamp: u64,
}

impl CellKey {
    pub fn new(row: impl Into<Bytes>, column: impl Into<Bytes>, timestamp: u64) -> Self {
        Self {
            row: row.into(),
            column: column.into(),
            timestamp,
        }
    }

    /// Tracked byte cost of a cell with this key and the given value.
    fn entry_size(&self, value: &Bytes) -> u64 {
        (self.row.len() + self.column.len() + std::mem::size_of::<u64>() + value.len()) as u64
    }
}

#[derive(Default)]
struct Cells {
    map: BTreeMap<CellKey, Bytes>,
    /// Highest sequence number appended to the active buffer.
    max_seq: u64,
}

/// In-memory sorted write buffer for one region.
pub struct MemStore {
    cells: RwLock<Cells>,
    /// Live-entry bytes of the active buffer. Mutated only under the
    /// `cells` write lock; read without it.
    size_bytes: AtomicU64,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(Cells::default()),
            size_bytes: AtomicU64::new(0),
        }
    }

    /// Appends a cell to the active buffer and returns the new tracked size.
    ///
    /// Re-appending an existing (row, column, timestamp) replaces the value
    /// and adjusts the size accordingly, never double-counts.
    pub fn append(
        &self,
        seq: u64,
        key: CellKey,
        value: Bytes,
    ) -> Result<u64, FlushError> {
        let mut cells = self.cells.write().map_lock_err()?;
        let added = key.entry_size(&value);
        let replaced = cells
            .map
            .insert(key.clone(), value)
            .map(|old| key.entry_size(&old))
            .unwrap_or(0);
        cells.max_seq = cells.max_seq.max(seq);
        let size = (self.size_bytes.load(Ordering::Relaxed) + added).saturating_sub(replaced);
        self.size_bytes.store(size, Ordering::Release);
        Ok(size)
    }

    /// Live-entry byte size of the active buffer only. An in-progress
    /// snapshot is not counted.
    pub fn current_size(&self) -> u64 {
        self.size_bytes.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.current_size() == 0
    }

    /// Number of cells in the active buffer.
    pub fn cell_count(&self) -> Result<usize, FlushError> {
        Ok(self.cells.read().map_lock_err()?.map.len())
    }

    /// Atomically moves all current entries into an immutable snapshot and
    /// resets the active buffer. Returns `None` if the buffer is empty.
    ///
    /// Appends racing this call land either in the returned snapshot or in
    /// the fresh buffer; the tracked size is zeroed inside the same critical
    /// section, so a reader observing size zero will find the data in the
    /// snapshot.
    pub fn snapshot_and_clear(&self) -> Result<Option<MemStoreSnapshot>, FlushError> {
        let mut cells = self.cells.write().map_lock_err()?;
        if cells.map.is_empty() {
            return Ok(None);
        }
        let map = std::mem::take(&mut cells.map);
        let max_seq = std::mem::take(&mut cells.max_seq);
        let size_bytes = self.size_bytes.swap(0, Ordering::AcqRel);
        Ok(Some(MemStoreSnapshot {
            cells: map,
            size_bytes,
            max_seq,
        }))
    }
}

/// Immutable copy of a memstore's contents taken at swap time, consumed only
/// by the in-progress flush.
#[derive(Debug, Clone)]
pub struct MemStoreSnapshot {
    cells: BTreeMap<CellKey, Bytes>,
    size_bytes: u64,
    max_seq: u64,
}

impl MemStoreSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = (&CellKey, &Bytes)> {
        self.cells.iter()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Highest sequence number captured by this snapshot, the durable
    /// low-water mark once the segment is registered.
    pub fn max_seq(&self) -> u64 {
        self.max_seq
    }
}
