//! VectorDecoder: turns one reassembled record into its change vectors,
//! classifies each by opcode family, and pairs undo/redo (and
//! partial-rollback/redo) vectors into the events the transaction router
//! consumes.

pub mod header;
pub mod opcodes;
pub mod record;

use crate::config::ParserConfig;
use crate::error::Result;
use crate::lwn::LwnMember;
use header::VectorHeader;
use record::RedoLogRecord;

pub use record::SessionInfo;

/// Opcode family, used to decide decoding and pairing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFamily {
    Undo,
    Begin,
    Commit,
    PartialRollback,
    DataDml,
    IndexLob,
    LobData,
    Ddl,
    Session,
    Unknown,
}

pub fn classify(op_code: u16) -> VectorFamily {
    match op_code {
        0x0501 => VectorFamily::Undo,
        0x0502 => VectorFamily::Begin,
        0x0504 => VectorFamily::Commit,
        0x0506 | 0x050B => VectorFamily::PartialRollback,
        0x0B02..=0x0B16 => VectorFamily::DataDml,
        0x0A02 | 0x0A08 | 0x0A12 => VectorFamily::IndexLob,
        0x1301 | 0x1A06 => VectorFamily::LobData,
        0x1801 => VectorFamily::Ddl,
        0x0513 | 0x0514 => VectorFamily::Session,
        _ => VectorFamily::Unknown,
    }
}

/// Decode every vector contained in one reassembled record, in order.
/// A record's vectors sit back-to-back starting right after the record
/// header; each vector's own length is implied by its field-lengths array,
/// so decoding walks forward until the payload is exhausted.
pub fn decode_member(member: &LwnMember, header_len: u32, cfg: &ParserConfig) -> Result<Vec<RedoLogRecord>> {
    let data = &member.payload;
    let mut cursor = header_len as usize;
    let mut out = Vec::new();

    while cursor + 4 <= data.len() {
        let vh = VectorHeader::parse(data, member.block, cursor, cfg.pre_12_1_format)?;
        let family = classify(vh.op_code);
        let mut rec = RedoLogRecord::from_header(vh.op_code, &vh);

        match family {
            VectorFamily::Undo => opcodes::decode_undo(data, member.block, &vh, &mut rec)?,
            VectorFamily::Begin => opcodes::decode_begin(data, member.block, &vh, &mut rec)?,
            VectorFamily::Commit => { /* routing reads flg_record directly off the header */ }
            VectorFamily::PartialRollback => opcodes::decode_partial_rollback(data, member.block, &vh, &mut rec)?,
            VectorFamily::DataDml => opcodes::decode_data_dml(data, member.block, &vh, &mut rec)?,
            VectorFamily::IndexLob if cfg.flags.experimental_lobs => {
                opcodes::decode_index_lob(data, member.block, &vh, &mut rec)?
            }
            VectorFamily::LobData if cfg.flags.experimental_lobs => {
                opcodes::decode_lob_data(data, member.block, &vh, &mut rec)?
            }
            VectorFamily::IndexLob | VectorFamily::LobData => {
                // LOB support disabled: keep the header, skip field decode.
            }
            VectorFamily::Ddl if cfg.flags.track_ddl => opcodes::decode_ddl(data, member.block, &vh, &mut rec)?,
            VectorFamily::Ddl => {}
            VectorFamily::Session => opcodes::decode_session(data, member.block, &vh, &mut rec)?,
            VectorFamily::Unknown => {}
        }

        if cfg.trace_level > 0 {
            log::trace!(
                "decoded vector op_code=0x{:04x} family={:?} block={} xid={}",
                vh.op_code,
                family,
                member.block,
                rec.xid
            );
        }

        out.push(rec);
        cursor = vh.field_pos;
        // Vectors are 4-byte aligned same as records; re-align defensively.
        cursor = (cursor + 3) & !3;
    }

    Ok(out)
}

/// Outcome of feeding one vector through the prev/cur pairing slots.
pub enum PairEvent {
    /// No companion arrived (or none is expected): route as a standalone
    /// vector, e.g. Commit, DDL, Session.
    Single(RedoLogRecord),
    /// Undo paired with its Data/Index/Session redo vector.
    Pair(RedoLogRecord, RedoLogRecord),
    /// Partial-rollback paired with the Data/Index vector it undoes.
    Rollback(RedoLogRecord, RedoLogRecord),
}

/// Two-slot pairing state machine, operated across the whole sorted member
/// stream of a checkpoint unit (vectors may pair across record
/// boundaries, since undo and its companion DML vector are usually, but
/// not always, written back to back).
#[derive(Default)]
pub struct Pairing {
    prev: Option<RedoLogRecord>,
}

impl Pairing {
    pub fn new() -> Self {
        Pairing { prev: None }
    }

    /// Feed the next decoded vector, draining zero or more pairing events.
    pub fn push(&mut self, cur: RedoLogRecord, events: &mut Vec<PairEvent>) {
        let family = classify(cur.op_code);

        // Opcodes that never pair bypass the slot machine entirely.
        if matches!(family, VectorFamily::Commit | VectorFamily::Ddl | VectorFamily::Session) {
            if let Some(prev) = self.prev.take() {
                events.push(PairEvent::Single(prev));
            }
            events.push(PairEvent::Single(cur));
            return;
        }

        let Some(prev) = self.prev.take() else {
            self.prev = Some(cur);
            return;
        };

        let prev_family = classify(prev.op_code);
        let companion = matches!(family, VectorFamily::DataDml | VectorFamily::IndexLob);
        let rollback_target = matches!(prev_family, VectorFamily::DataDml | VectorFamily::IndexLob);

        if prev_family == VectorFamily::Undo && companion {
            if bdba_conflict(&prev, &cur) {
                log::warn!(
                    "bdba mismatch in undo/redo pair (xid={}): {} vs {}",
                    prev.xid,
                    prev.bdba,
                    cur.bdba
                );
                return;
            }
            let mut cur = cur;
            promote_companion(&prev, &mut cur);
            events.push(PairEvent::Pair(prev, cur));
            return;
        }

        if family == VectorFamily::PartialRollback && rollback_target {
            if bdba_conflict(&prev, &cur) {
                log::warn!(
                    "bdba mismatch in rollback pair (xid={}): {} vs {}",
                    cur.xid,
                    prev.bdba,
                    cur.bdba
                );
                return;
            }
            events.push(PairEvent::Rollback(prev, cur));
            return;
        }

        // No pairing relationship: emit prev alone, cur becomes the new prev.
        events.push(PairEvent::Single(prev));
        self.prev = Some(cur);
    }

    /// Emit a trailing `Single` if a vector is still waiting for a
    /// companion at the end of the unit.
    pub fn flush(&mut self, events: &mut Vec<PairEvent>) {
        if let Some(prev) = self.prev.take() {
            events.push(PairEvent::Single(prev));
        }
    }
}

fn bdba_conflict(a: &RedoLogRecord, b: &RedoLogRecord) -> bool {
    a.bdba != 0 && b.bdba != 0 && a.bdba != b.bdba
}

/// Copy `obj`/`data_obj` learned from the undo vector onto its paired
/// Data/Index vector (invariant: paired vectors share the same obj/data_obj
/// after promotion).
fn promote_companion(prev: &RedoLogRecord, cur: &mut RedoLogRecord) {
    cur.obj = prev.obj;
    cur.data_obj = prev.data_obj;
    if cur.bdba == 0 {
        cur.bdba = prev.bdba;
    }
}
