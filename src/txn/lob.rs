//! LOB tracking: data vectors (0x1301/0x1A06) are addressed by `lob_id`,
//! not by transaction, and can arrive before the index vector that tells
//! the router which transaction owns them. `LobCtx` lives on `Transaction`
//! and records the page/data mapping once ownership is known; `OrphanedLobs`
//! holds the raw chunks until that happens.

use std::collections::HashMap;

use crate::types::{Dba, LobId};
use crate::vector::record::RedoLogRecord;

/// Everything known about one LOB value within a transaction: the page
/// index built from index vectors, and the raw page bytes built from data
/// vectors, keyed by the `dba` each chunk landed at (§3.1).
#[derive(Debug, Clone, Default)]
pub struct LobData {
    pub page_size: u32,
    pub size_pages: u32,
    pub size_rest: u32,
    pub index_map: HashMap<u32, Dba>,
    pub data_map: HashMap<Dba, Vec<u8>>,
}

impl LobData {
    fn record_index(&mut self, page_no: u32, dba: Dba) {
        self.index_map.insert(page_no, dba);
        self.size_pages = self.size_pages.max(page_no + 1);
    }

    fn record_data(&mut self, dba: Dba, bytes: Vec<u8>) {
        if self.page_size == 0 {
            self.page_size = bytes.len() as u32;
        }
        self.data_map.insert(dba, bytes);
    }
}

/// Per-transaction `LobId -> LobData` map (§3.1 `lob_ctx`).
#[derive(Debug, Default)]
pub struct LobCtx {
    lobs: HashMap<LobId, LobData>,
}

impl LobCtx {
    pub fn new() -> Self {
        LobCtx::default()
    }

    /// Record a page-number-to-dba mapping learned from an index vector.
    pub fn record_index(&mut self, lob_id: LobId, page_no: u32, dba: Dba) {
        self.lobs.entry(lob_id).or_default().record_index(page_no, dba);
    }

    /// Record one chunk of LOB page bytes, keyed by the dba it was written at.
    pub fn record_data(&mut self, lob_id: LobId, dba: Dba, bytes: Vec<u8>) {
        self.lobs.entry(lob_id).or_default().record_data(dba, bytes);
    }

    pub fn get(&self, lob_id: &LobId) -> Option<&LobData> {
        self.lobs.get(lob_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lobs.len()
    }
}

/// LOB data vectors seen before any index vector established which
/// transaction owns their `lob_id`. Held here until a later index vector
/// adopts them (scenario S4: orphan-then-adopt).
#[derive(Debug, Default)]
pub struct OrphanedLobs {
    pending: HashMap<LobId, Vec<RedoLogRecord>>,
}

impl OrphanedLobs {
    pub fn new() -> Self {
        OrphanedLobs::default()
    }

    pub fn orphan(&mut self, lob_id: LobId, chunk: RedoLogRecord) {
        self.pending.entry(lob_id).or_default().push(chunk);
    }

    /// Called once an index vector establishes the owning `lob_id`;
    /// returns every chunk queued under it, in arrival order.
    pub fn adopt(&mut self, lob_id: &LobId) -> Option<Vec<RedoLogRecord>> {
        self.pending.remove(lob_id)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
