//! Builder trait: the parser's output collaborator (§6.2). A `Builder`
//! receives committed transactions in commit-SCN order and turns them into
//! whatever downstream representation it wants (trace log, Avro, a change
//! stream). Modeled on the reference server's `EngineHandler` trait:
//! a small surface with default no-op methods so implementors only
//! override what they care about.

use crate::error::Result;
use crate::txn::router::CompletedTransaction;

pub trait Builder: Send {
    /// A transaction has committed (or rolled back, in which case the
    /// caller never calls this for it) and is ready to be emitted.
    fn commit_transaction(&mut self, txn: &CompletedTransaction) -> Result<()>;

    /// A completed LWN (or a log switch with an unflushed tail) has reached
    /// the durable checkpoint cutoff; `switch_redo` is set for the latter.
    /// Default is a no-op.
    fn process_checkpoint(
        &mut self,
        _scn: u64,
        _timestamp: u32,
        _sequence: u32,
        _offset: u64,
        _switch_redo: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// Called when the parser is shutting down, to let the builder flush
    /// any buffered output.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Minimal `Builder` used by tests and the CLI's default run mode: logs a
/// trace line per committed transaction instead of emitting structured
/// output, matching the original implementation's `dumpLogFile` mode.
#[derive(Default)]
pub struct TraceBuilder {
    pub commits_seen: usize,
    /// `(scn, timestamp, sequence, offset, switch_redo)` for every
    /// `process_checkpoint` call, in call order. Tests assert against this
    /// instead of scraping logs.
    pub checkpoints_seen: Vec<(u64, u32, u32, u64, bool)>,
}

impl Builder for TraceBuilder {
    fn commit_transaction(&mut self, txn: &CompletedTransaction) -> Result<()> {
        self.commits_seen += 1;
        log::info!(
            "commit xid={} scn={} ops={}",
            txn.xid,
            txn.commit_scn,
            txn.buffer_len
        );
        Ok(())
    }

    fn process_checkpoint(
        &mut self,
        scn: u64,
        timestamp: u32,
        sequence: u32,
        offset: u64,
        switch_redo: bool,
    ) -> Result<()> {
        self.checkpoints_seen.push((scn, timestamp, sequence, offset, switch_redo));
        log::info!(
            "checkpoint scn={scn} timestamp={timestamp} sequence={sequence} offset={offset} switch_redo={switch_redo}"
        );
        Ok(())
    }
}
