//! `RedoLogRecord`: one decoded change vector, opcode fields flattened onto
//! a single struct in the reference parser's style (compare `RedoBlock`,
//! `LwnMember`: plain data holders, no per-opcode subtyping).

use crate::types::{Dba, LobId, Scn, Xid};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: u32,
    pub serial: u16,
    pub flags: u32,
    pub version: u32,
    pub audit_session_id: u32,
}

#[derive(Debug, Clone)]
pub struct RedoLogRecord {
    pub op_code: u16,
    pub cls: u16,
    pub afn: u32,
    pub dba: Dba,
    pub scn_record: Scn,
    pub seq: u8,
    pub typ: u8,
    pub flg_record: u16,
    pub con_id: u16,

    pub xid: Xid,
    pub uba: u64,
    pub obj: u32,
    pub data_obj: u32,
    pub bdba: Dba,
    pub slot: u16,

    pub field_cnt: u16,
    pub field_lengths_delta: u32,
    pub field_pos: u32,

    /// Copied through unchanged; no decode-time behavior keys off these.
    pub fbi: u8,
    pub rbl: u32,
    /// Full, untruncated parent xid (the original stores this in a
    /// 16-bit field, silently truncating `sqn`; this parser does not
    /// reproduce that bug, see SPEC_FULL.md §9).
    pub parent_xid: Option<Xid>,
    pub pdb_id: Option<u64>,

    pub lob_id: Option<LobId>,
    pub lob_page_no: Option<u32>,
    pub ind_key: Option<Vec<u8>>,
    pub ind_key_length: Option<u32>,

    pub session_info: Option<SessionInfo>,

    /// Opaque row/LOB/DDL-text bytes a Builder may want; not interpreted
    /// further by the decoder or router.
    pub payload: Vec<u8>,
}

impl RedoLogRecord {
    pub fn from_header(op_code: u16, h: &crate::vector::header::VectorHeader) -> Self {
        RedoLogRecord {
            op_code,
            cls: h.cls,
            afn: h.afn,
            dba: h.dba,
            scn_record: h.scn_record,
            seq: h.seq,
            typ: h.typ,
            flg_record: h.flg_record,
            con_id: h.con_id,
            xid: Xid::ZERO,
            uba: 0,
            obj: 0,
            data_obj: 0,
            bdba: 0,
            slot: 0,
            field_cnt: h.field_cnt,
            field_lengths_delta: h.field_lengths_delta as u32,
            field_pos: h.field_pos as u32,
            fbi: 0,
            rbl: 0,
            parent_xid: None,
            pdb_id: None,
            lob_id: None,
            lob_page_no: None,
            ind_key: None,
            ind_key_length: None,
            session_info: None,
            payload: Vec::new(),
        }
    }
}
