//! In-flight transaction state: a chunked buffer of paired ops plus the
//! bookkeeping the checkpoint engine needs to know how far back it must
//! keep the redo stream available.

use crate::txn::lob::LobCtx;
use crate::types::{Dba, Scn, Xid};
use crate::vector::record::RedoLogRecord;

/// One routed operation: either a matched undo/redo pair, or a
/// partial-rollback pair that undoes a previously buffered change.
#[derive(Debug, Clone)]
pub enum TxnOp {
    Change { redo: RedoLogRecord, undo: RedoLogRecord },
    Rollback { target: RedoLogRecord, rollback: RedoLogRecord },
    Ddl(RedoLogRecord),
    LobChunk(RedoLogRecord),
}

impl TxnOp {
    fn approx_size(&self) -> u64 {
        let len = match self {
            TxnOp::Change { redo, undo } => redo.payload.len() + undo.payload.len(),
            TxnOp::Rollback { target, rollback } => target.payload.len() + rollback.payload.len(),
            TxnOp::Ddl(rec) | TxnOp::LobChunk(rec) => rec.payload.len(),
        };
        len as u64
    }
}

/// Chunk size for `TransactionBuffer`'s backing vecs, picked so a typical
/// OLTP transaction's ops live in one chunk without over-allocating for
/// single-row transactions.
const CHUNK_SIZE: usize = 64;

/// A chunked arena of `TxnOp`s. Appending never needs to move previously
/// stored ops, so references handed out by `last()` stay valid across
/// later pushes to other chunks.
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    chunks: Vec<Vec<TxnOp>>,
}

impl TransactionBuffer {
    pub fn new() -> Self {
        TransactionBuffer { chunks: Vec::new() }
    }

    pub fn push(&mut self, op: TxnOp) {
        match self.chunks.last_mut() {
            Some(chunk) if chunk.len() < CHUNK_SIZE => chunk.push(op),
            _ => self.chunks.push(vec![op]),
        }
    }

    /// Walk the chunks backward looking for a `Change` whose redo vector's
    /// `(obj, bdba, slot)` match the rollback target, removing that entry
    /// in place (§4.4). `None` if no buffered change matches.
    pub fn remove_matching(&mut self, obj: u32, bdba: Dba, slot: u16) -> Option<TxnOp> {
        for chunk in self.chunks.iter_mut().rev() {
            if let Some(pos) = chunk.iter().rposition(|op| matches_target(op, obj, bdba, slot)) {
                return Some(chunk.remove(pos));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &TxnOp> {
        self.chunks.iter().flat_map(|c| c.iter())
    }
}

fn matches_target(op: &TxnOp, obj: u32, bdba: Dba, slot: u16) -> bool {
    matches!(op, TxnOp::Change { redo, .. } if redo.obj == obj && redo.bdba == bdba && redo.slot == slot)
}

/// Checkpoint-visible summary of a transaction's oldest still-needed redo
/// position, used to compute the persisted checkpoint state's
/// `min_sequence`/`min_offset`/`min_xid` (§6.3).
pub struct TransactionCheckpoint {
    pub min_sequence: u32,
    pub min_offset: u64,
    pub min_xid: Xid,
}

#[derive(Debug)]
pub struct Transaction {
    pub xid: Xid,
    pub pdb_id: Option<u64>,
    pub first_sequence: u32,
    pub first_offset: u64,
    pub commit_scn: Option<Scn>,
    pub commit_timestamp: Option<u32>,
    pub is_rollback: bool,
    pub size_bytes: u64,
    pub skip: bool,
    /// Set once a DML vector resolves to a table flagged as a system table
    /// by the schema metadata collaborator (§4.3 Schema filter).
    pub system: bool,
    /// Set once a DML vector resolves to a debug table via a `0x0B02`
    /// insert (§4.3 Schema filter).
    pub shutdown: bool,
    pub buffer: TransactionBuffer,
    pub lob_ctx: LobCtx,
}

impl Transaction {
    pub fn new(xid: Xid, pdb_id: Option<u64>, sequence: u32, offset: u64) -> Self {
        Transaction {
            xid,
            pdb_id,
            first_sequence: sequence,
            first_offset: offset,
            commit_scn: None,
            commit_timestamp: None,
            is_rollback: false,
            size_bytes: 0,
            skip: false,
            system: false,
            shutdown: false,
            buffer: TransactionBuffer::new(),
            lob_ctx: LobCtx::new(),
        }
    }

    pub fn append(&mut self, op: TxnOp) {
        self.size_bytes += op.approx_size();
        self.buffer.push(op);
    }

    /// Remove the buffered change whose redo vector's `(obj, bdba, slot)`
    /// match the rollback target (§4.4): the transaction stays alive, but
    /// the undone change never reaches the builder.
    pub fn rollback_last_op(&mut self, obj: u32, bdba: Dba, slot: u16) -> Option<TxnOp> {
        self.buffer.remove_matching(obj, bdba, slot)
    }

    pub fn checkpoint(&self) -> TransactionCheckpoint {
        TransactionCheckpoint {
            min_sequence: self.first_sequence,
            min_offset: self.first_offset,
            min_xid: self.xid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::header::VectorHeader;

    fn rec(op_code: u16) -> RedoLogRecord {
        RedoLogRecord::from_header(
            op_code,
            &VectorHeader {
                op_code,
                cls: 0,
                afn: 0,
                dba: 0,
                scn_record: Scn(1),
                seq: 0,
                typ: 0,
                con_id: 0,
                flg_record: 0,
                field_cnt: 0,
                field_lengths_delta: 0,
                field_pos: 0,
            },
        )
    }

    fn rec_at(op_code: u16, obj: u32, bdba: u32, slot: u16) -> RedoLogRecord {
        let mut r = rec(op_code);
        r.obj = obj;
        r.bdba = bdba;
        r.slot = slot;
        r
    }

    #[test]
    fn rollback_last_op_removes_the_matching_change() {
        let mut tx = Transaction::new(Xid::new(1, 2, 3), None, 10, 0);
        tx.append(TxnOp::Change { redo: rec_at(0x0B02, 1, 100, 0), undo: rec(0x0501) });
        tx.append(TxnOp::Change { redo: rec_at(0x0B05, 1, 200, 1), undo: rec(0x0501) });
        assert_eq!(tx.buffer.len(), 2);
        let removed = tx.rollback_last_op(1, 200, 1).unwrap();
        assert!(matches!(removed, TxnOp::Change { redo, .. } if redo.op_code == 0x0B05));
        assert_eq!(tx.buffer.len(), 1);
    }

    #[test]
    fn rollback_last_op_can_target_an_earlier_change() {
        let mut tx = Transaction::new(Xid::new(1, 2, 3), None, 10, 0);
        tx.append(TxnOp::Change { redo: rec_at(0x0B02, 1, 100, 0), undo: rec(0x0501) });
        tx.append(TxnOp::Change { redo: rec_at(0x0B05, 1, 200, 1), undo: rec(0x0501) });
        let removed = tx.rollback_last_op(1, 100, 0).unwrap();
        assert!(matches!(removed, TxnOp::Change { redo, .. } if redo.op_code == 0x0B02));
        assert_eq!(tx.buffer.len(), 1);
        assert!(tx
            .buffer
            .iter()
            .any(|op| matches!(op, TxnOp::Change { redo, .. } if redo.op_code == 0x0B05)));
    }

    #[test]
    fn rollback_with_no_matching_change_is_a_no_op() {
        let mut tx = Transaction::new(Xid::new(1, 2, 3), None, 10, 0);
        tx.append(TxnOp::Change { redo: rec_at(0x0B02, 1, 100, 0), undo: rec(0x0501) });
        assert!(tx.rollback_last_op(9, 9, 9).is_none());
        assert_eq!(tx.buffer.len(), 1);
    }

    #[test]
    fn buffer_spans_multiple_chunks() {
        let mut buf = TransactionBuffer::new();
        for _ in 0..(CHUNK_SIZE * 2 + 1) {
            buf.push(TxnOp::Change { redo: rec(0x0B02), undo: rec(0x0501) });
        }
        assert_eq!(buf.len(), CHUNK_SIZE * 2 + 1);
        assert_eq!(buf.chunks.len(), 3);
    }
}
