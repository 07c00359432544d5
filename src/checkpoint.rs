//! Persisted checkpoint state and the engine that flushes completed
//! transactions (in SCN order) and advances it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::Builder;
use crate::error::Result;
use crate::txn::router::CompletedTransaction;
use crate::types::{Scn, Xid};

/// On-disk checkpoint marker (§6.3), written as JSON in the reference
/// server's recovery-marker style (`RecoveryManager::read_checkpoint`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointState {
    pub resetlogs: u32,
    pub activation: u32,
    pub sequence: u32,
    pub scn: u64,
    pub timestamp: u32,
    pub offset: u64,
    pub min_sequence: u32,
    pub min_offset: u64,
    pub min_xid: Xid,
    pub schema_first_scn: u64,
}

impl CheckpointState {
    pub fn initial(resetlogs: u32, activation: u32, first_scn: u64) -> Self {
        CheckpointState {
            resetlogs,
            activation,
            sequence: 0,
            scn: first_scn,
            timestamp: 0,
            offset: 0,
            min_sequence: 0,
            min_offset: 0,
            min_xid: Xid::ZERO,
            schema_first_scn: first_scn,
        }
    }

    fn path(data_dir: &Path) -> PathBuf {
        data_dir.join("checkpoint.json")
    }

    pub fn load(data_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(data_dir);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir)?;
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(data_dir), raw)?;
        Ok(())
    }
}

/// Flushes completed transactions to the `Builder` in ascending commit-SCN
/// order and advances/persists the checkpoint state every
/// `checkpoint_interval_lwns` completed LWNs.
pub struct CheckpointEngine {
    state: CheckpointState,
    data_dir: PathBuf,
    interval: u32,
    lwns_since_save: u32,
    first_data_scn: Scn,
    /// The scn of the last `process_checkpoint` notification sent to the
    /// builder, so a log switch or EOF with nothing new flushed since the
    /// last LWN doesn't emit a duplicate.
    last_notified_scn: Option<u64>,
}

impl CheckpointEngine {
    pub fn new(state: CheckpointState, data_dir: PathBuf, interval: u32, first_data_scn: Scn) -> Self {
        CheckpointEngine {
            state,
            data_dir,
            interval: interval.max(1),
            lwns_since_save: 0,
            first_data_scn,
            last_notified_scn: None,
        }
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Flush a batch of transactions completed within one LWN unit, sorted
    /// ascending by commit SCN, then advance and (periodically) persist
    /// the checkpoint state.
    pub fn flush(
        &mut self,
        mut completed: Vec<CompletedTransaction>,
        lwn_scn: Scn,
        lwn_timestamp: u32,
        lwn_sequence: u32,
        lwn_offset: u64,
        builder: &mut dyn Builder,
    ) -> Result<()> {
        completed.sort_by_key(|t| t.commit_scn);
        for txn in &completed {
            if !txn.is_rollback {
                builder.commit_transaction(txn)?;
            }
        }

        if let Some(min) = completed.iter().map(|t| &t.checkpoint).min_by_key(|c| (c.min_sequence, c.min_offset)) {
            self.state.min_sequence = min.min_sequence;
            self.state.min_offset = min.min_offset;
            self.state.min_xid = min.min_xid;
        }
        self.state.scn = lwn_scn.0;
        self.state.timestamp = lwn_timestamp;
        self.state.sequence = lwn_sequence;
        self.state.offset = lwn_offset;

        if lwn_scn > self.first_data_scn {
            builder.process_checkpoint(lwn_scn.0, lwn_timestamp, lwn_sequence, lwn_offset, false)?;
            self.last_notified_scn = Some(lwn_scn.0);
        }

        self.lwns_since_save += 1;
        if self.lwns_since_save >= self.interval {
            self.state.save(&self.data_dir)?;
            self.lwns_since_save = 0;
        }
        Ok(())
    }

    /// Force-persist the checkpoint state, used on log switch and on
    /// graceful shutdown.
    pub fn force_save(&mut self) -> Result<()> {
        self.state.save(&self.data_dir)?;
        self.lwns_since_save = 0;
        Ok(())
    }

    /// Notify the builder of an unflushed `lwn_scn` past the data cutoff,
    /// with `switch_redo=true`, unless it was already notified as the most
    /// recent ordinary checkpoint.
    fn emit_switch_checkpoint(&mut self, builder: &mut dyn Builder) -> Result<()> {
        if Scn(self.state.scn) > self.first_data_scn && self.last_notified_scn != Some(self.state.scn) {
            builder.process_checkpoint(
                self.state.scn,
                self.state.timestamp,
                self.state.sequence,
                self.state.offset,
                true,
            )?;
            self.last_notified_scn = Some(self.state.scn);
        }
        Ok(())
    }

    /// Handle a redo log switch: notify the builder of any unflushed tail,
    /// then force a persisted checkpoint so the next reader restart resumes
    /// at exactly this boundary.
    pub fn on_log_switch(&mut self, new_sequence: u32, builder: &mut dyn Builder) -> Result<()> {
        self.emit_switch_checkpoint(builder)?;
        self.state.sequence = new_sequence;
        self.state.offset = 0;
        self.force_save()
    }

    /// Handle reader EOF with no further log switch: the same unflushed-tail
    /// notification as a log switch, without advancing `sequence`.
    pub fn on_eof(&mut self, builder: &mut dyn Builder) -> Result<()> {
        self.emit_switch_checkpoint(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn checkpoint_state_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let state = CheckpointState::initial(1, 1, 100);
        state.save(dir.path()).unwrap();
        let loaded = CheckpointState::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_checkpoint_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(CheckpointState::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn flush_notifies_the_builder_once_lwn_scn_passes_the_cutoff() {
        let dir = tempdir().unwrap();
        let state = CheckpointState::initial(1, 1, 10);
        let mut engine = CheckpointEngine::new(state, dir.path().to_path_buf(), 1, Scn(10));
        let mut builder = crate::builder::TraceBuilder::default();

        engine.flush(Vec::new(), Scn(5), 123, 1, 0, &mut builder).unwrap();
        assert!(builder.checkpoints_seen.is_empty(), "scn below the cutoff must not notify");

        engine.flush(Vec::new(), Scn(50), 456, 1, 64, &mut builder).unwrap();
        assert_eq!(builder.checkpoints_seen, vec![(50, 456, 1, 64, false)]);
    }

    #[test]
    fn log_switch_does_not_renotify_a_scn_already_flushed() {
        let dir = tempdir().unwrap();
        let state = CheckpointState::initial(1, 1, 10);
        let mut engine = CheckpointEngine::new(state, dir.path().to_path_buf(), 1, Scn(10));
        let mut builder = crate::builder::TraceBuilder::default();

        engine.flush(Vec::new(), Scn(50), 456, 1, 64, &mut builder).unwrap();
        assert_eq!(builder.checkpoints_seen.len(), 1);

        engine.on_log_switch(2, &mut builder).unwrap();
        assert_eq!(builder.checkpoints_seen.len(), 1, "already-notified scn must not be sent again");
    }

    #[test]
    fn log_switch_notifies_an_unflushed_tail_with_switch_redo() {
        let dir = tempdir().unwrap();
        let mut state = CheckpointState::initial(1, 1, 0);
        state.scn = 500;
        state.timestamp = 777;
        state.sequence = 3;
        state.offset = 128;
        let mut engine = CheckpointEngine::new(state, dir.path().to_path_buf(), 1, Scn(10));
        let mut builder = crate::builder::TraceBuilder::default();

        engine.on_log_switch(4, &mut builder).unwrap();
        assert_eq!(builder.checkpoints_seen, vec![(500, 777, 3, 128, true)]);
    }

    #[test]
    fn on_eof_notifies_an_unflushed_tail_without_advancing_sequence() {
        let dir = tempdir().unwrap();
        let mut state = CheckpointState::initial(1, 1, 0);
        state.scn = 500;
        let mut engine = CheckpointEngine::new(state, dir.path().to_path_buf(), 1, Scn(10));
        let mut builder = crate::builder::TraceBuilder::default();

        engine.on_eof(&mut builder).unwrap();
        assert_eq!(builder.checkpoints_seen.len(), 1);
        assert!(builder.checkpoints_seen[0].4);
        assert_eq!(engine.state().sequence, 1, "on_eof must not touch sequence");
    }
}
