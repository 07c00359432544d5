//! RecordAssembler: reconstructs variable-length records from a stream of
//! fixed-size blocks and groups them, sorted by `(scn, sub_scn)`, into
//! completed checkpoint units.

use crate::block::{pad4, read_u32, RedoBlock, BLOCK_HEADER_LEN};
use crate::error::{RedoError, Result};
use crate::lwn::{LwnArena, LwnHeader, LwnMember, LWN_HEADER_LEN, LWN_HEADER_OFFSET};
use crate::record_header::RecordHeader;
use crate::types::Scn;

/// A record still being copied in from across one or more block boundaries.
struct PendingRecord {
    payload: Vec<u8>,
    remaining: u32,
    start_block: u64,
    start_offset: u32,
}

/// Result of feeding one block to the assembler.
pub enum AssembleEvent {
    /// The current checkpoint unit is still being accumulated.
    Continue,
    /// `lwn_num == lwn_num_max` was just reached: every member of the unit
    /// (possibly spanning several physical LWN sub-groups) is ready,
    /// sorted ascending by `(scn, sub_scn)`.
    UnitComplete {
        header: LwnHeader,
        members: Vec<LwnMember>,
    },
}

pub struct RecordAssembler {
    reader_first_scn: Scn,
    reader_next_scn: Option<Scn>,
    current_lwn: Option<LwnHeader>,
    lwn_start_block: u64,
    arena: LwnArena,
    pending: Option<PendingRecord>,
}

impl RecordAssembler {
    pub fn new(reader_first_scn: Scn, reader_next_scn: Option<Scn>) -> Self {
        RecordAssembler {
            reader_first_scn,
            reader_next_scn,
            current_lwn: None,
            lwn_start_block: 0,
            arena: LwnArena::new(),
            pending: None,
        }
    }

    /// Feed the next block in file order.
    pub fn feed(&mut self, block: &RedoBlock) -> Result<AssembleEvent> {
        if block.data.len() <= BLOCK_HEADER_LEN {
            return Err(RedoError::parse(block.number, 0, "block shorter than block header"));
        }

        let mut body_cursor = BLOCK_HEADER_LEN;
        let mut header_seen_this_block = None;

        if self.current_lwn.is_none() {
            let header = LwnHeader::parse(&block.data, block.number)?;
            self.validate_lwn_scn(&header, block.number)?;
            header_seen_this_block = Some(header);
            self.current_lwn = Some(header);
            self.lwn_start_block = block.number;
            body_cursor = LWN_HEADER_OFFSET + LWN_HEADER_LEN;
        }

        // Walk the rest of the block body in 4-byte-aligned steps,
        // continuing any record left over from a previous block.
        while body_cursor < block.data.len() {
            if let Some(pending) = self.pending.as_mut() {
                let avail = block.data.len() - body_cursor;
                let take = avail.min(pending.remaining as usize);
                pending
                    .payload
                    .extend_from_slice(&block.data[body_cursor..body_cursor + take]);
                pending.remaining -= take as u32;
                body_cursor += take;
                if pending.remaining == 0 {
                    let pending = self.pending.take().unwrap();
                    self.finish_record(pending, block.number)?;
                }
                continue;
            }

            // Need at least 4 bytes for a new length prefix; if fewer
            // remain, the rest of the block is alignment padding.
            if block.data.len() - body_cursor < 4 {
                break;
            }
            let declared_len = read_u32(&block.data, block.number, body_cursor)?;
            if declared_len == 0 {
                // Padding to the end of the block.
                break;
            }
            let padded_len = pad4(declared_len);

            let avail = (block.data.len() - body_cursor) as u32;
            let take = avail.min(padded_len);
            let mut payload = Vec::with_capacity(padded_len as usize);
            payload.extend_from_slice(&block.data[body_cursor..body_cursor + take as usize]);
            body_cursor += take as usize;

            if take < padded_len {
                self.pending = Some(PendingRecord {
                    payload,
                    remaining: padded_len - take,
                    start_block: block.number,
                    start_offset: (body_cursor as u32).saturating_sub(take),
                });
            } else {
                let start_offset = (body_cursor as u32) - take;
                self.finish_payload(payload, block.number, start_offset)?;
            }
        }

        let header = self.current_lwn.expect("lwn header established above");
        let lwn_end_block = self.lwn_start_block + header.lwn_length.max(1) as u64 - 1;
        if block.number == lwn_end_block {
            if self.pending.is_some() {
                return Err(RedoError::parse(
                    block.number,
                    block.data.len() as u32,
                    "record still incomplete at LWN boundary",
                ));
            }
            if header.is_checkpoint_boundary() {
                let members = std::mem::take(&mut self.arena).into_members();
                self.current_lwn = None;
                return Ok(AssembleEvent::UnitComplete { header, members });
            } else {
                // Intermediate LWN of the same checkpoint unit: keep
                // accumulating into the same arena, expect the next
                // block to open a new LWN header.
                self.current_lwn = None;
            }
        }

        let _ = header_seen_this_block;
        Ok(AssembleEvent::Continue)
    }

    fn validate_lwn_scn(&self, header: &LwnHeader, block: u64) -> Result<()> {
        if header.lwn_scn < self.reader_first_scn {
            return Err(RedoError::parse(
                block,
                LWN_HEADER_OFFSET as u32,
                format!("lwn_scn {} below reader.first_scn {}", header.lwn_scn, self.reader_first_scn),
            ));
        }
        if let Some(next) = self.reader_next_scn {
            if next != Scn::ZERO && header.lwn_scn > next {
                return Err(RedoError::parse(
                    block,
                    LWN_HEADER_OFFSET as u32,
                    format!("lwn_scn {} above reader.next_scn {}", header.lwn_scn, next),
                ));
            }
        }
        Ok(())
    }

    fn finish_payload(&mut self, payload: Vec<u8>, block: u64, offset: u32) -> Result<()> {
        let pending = PendingRecord {
            payload,
            remaining: 0,
            start_block: block,
            start_offset: offset,
        };
        self.finish_record(pending, block)
    }

    fn finish_record(&mut self, pending: PendingRecord, block: u64) -> Result<()> {
        let header = RecordHeader::parse(&pending.payload, pending.start_block)?;
        let member = LwnMember {
            block: pending.start_block,
            offset: pending.start_offset,
            scn: header.scn,
            sub_scn: header.sub_scn,
            payload: pending.payload,
        };
        let _ = block;
        self.arena.insert_sorted(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lwn_header_block(number: u64, lwn_num: u16, lwn_num_max: u16, lwn_length: u32, size: usize) -> Vec<u8> {
        let mut data = vec![0u8; size];
        let base = LWN_HEADER_OFFSET;
        data[base] = 0x04;
        data[base + 2..base + 4].copy_from_slice(&lwn_num.to_le_bytes());
        data[base + 4..base + 6].copy_from_slice(&lwn_num_max.to_le_bytes());
        data[base + 6..base + 10].copy_from_slice(&lwn_length.to_le_bytes());
        let _ = number;
        data
    }

    fn write_record(data: &mut [u8], offset: usize, scn: u64, sub_scn: u16, total_len: u32) {
        data[offset..offset + 4].copy_from_slice(&total_len.to_le_bytes());
        data[offset + 4] = 0x00; // plain header
        data[offset + 6..offset + 12].copy_from_slice(&scn.to_le_bytes()[0..6]);
        data[offset + 12..offset + 14].copy_from_slice(&sub_scn.to_le_bytes());
    }

    #[test]
    fn single_block_single_lwn_unit() {
        let size = 256;
        let mut data = lwn_header_block(2, 1, 1, 1, size);
        let rec_off = LWN_HEADER_OFFSET + LWN_HEADER_LEN;
        write_record(&mut data, rec_off, 100, 0, 24);

        let block = RedoBlock::new(2, data);
        let mut assembler = RecordAssembler::new(Scn(0), None);
        match assembler.feed(&block).unwrap() {
            AssembleEvent::UnitComplete { members, .. } => {
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].scn.0, 100);
            }
            AssembleEvent::Continue => panic!("expected unit complete"),
        }
    }

    #[test]
    fn members_sorted_ascending_by_scn_sub_scn() {
        let size = 256;
        let mut data = lwn_header_block(2, 1, 1, 1, size);
        let rec_off = LWN_HEADER_OFFSET + LWN_HEADER_LEN;
        write_record(&mut data, rec_off, 500, 2, 24);
        write_record(&mut data, rec_off + 24, 100, 0, 24);
        write_record(&mut data, rec_off + 48, 500, 1, 24);

        let block = RedoBlock::new(2, data);
        let mut assembler = RecordAssembler::new(Scn(0), None);
        match assembler.feed(&block).unwrap() {
            AssembleEvent::UnitComplete { members, .. } => {
                let keys: Vec<_> = members.iter().map(|m| (m.scn.0, m.sub_scn)).collect();
                assert_eq!(keys, vec![(100, 0), (500, 1), (500, 2)]);
            }
            AssembleEvent::Continue => panic!("expected unit complete"),
        }
    }

    #[test]
    fn record_spanning_two_blocks_is_reassembled() {
        let size = 64;
        let rec_off = LWN_HEADER_OFFSET + LWN_HEADER_LEN;
        let total_len = 48u32;
        // lwn_num == lwn_num_max == 1: this is the unit's only (and thus
        // checkpoint-boundary) LWN, spanning 2 physical blocks.
        let mut first = lwn_header_block(2, 1, 1, 2, size);
        write_record(&mut first, rec_off, 10, 0, total_len);
        let block1 = RedoBlock::new(2, first);

        // Second block is plain continuation bytes after its own 16-byte
        // block header; all zero is fine, the assembler only counts bytes.
        let second = vec![0u8; size];
        let block2 = RedoBlock::new(3, second);

        let mut assembler = RecordAssembler::new(Scn(0), None);
        let ev1 = assembler.feed(&block1).unwrap();
        assert!(matches!(ev1, AssembleEvent::Continue));
        let ev2 = assembler.feed(&block2).unwrap();
        match ev2 {
            AssembleEvent::UnitComplete { members, .. } => {
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].payload.len(), total_len as usize);
            }
            AssembleEvent::Continue => panic!("expected unit complete at lwn_length=2"),
        }
    }

    #[test]
    fn lwn_scn_out_of_reader_range_is_fatal() {
        let size = 128;
        let data = lwn_header_block(2, 1, 1, 1, size);
        let mut data = data;
        // lwn_scn left at 0 in header bytes; require first_scn > 0 to force failure
        data[LWN_HEADER_OFFSET + 10..LWN_HEADER_OFFSET + 18].copy_from_slice(&0u64.to_le_bytes());
        let block = RedoBlock::new(2, data);
        let mut assembler = RecordAssembler::new(Scn(500), None);
        assert!(assembler.feed(&block).is_err());
    }
}
