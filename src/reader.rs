//! Reader trait: the parser's input collaborator (§6.1). A `Reader` hands
//! back fixed-size blocks in file order and reports log-switch boundaries;
//! the parser never touches a filesystem or socket directly.

use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::block::{RedoBlock, FIRST_DATA_BLOCK};
use crate::error::Result;

/// One unit of work handed back by `next_block`.
pub enum ReadEvent {
    /// The next block in the current redo file.
    Block(RedoBlock),
    /// The current file is exhausted and the reader switched to
    /// `new_sequence`; the parser should force a checkpoint save.
    LogSwitch { new_sequence: u32 },
    /// No block is available yet; the caller should suspend and retry
    /// (the first of the two suspension points in §5).
    WouldBlock,
    /// The reader has nothing further to produce (end of input, used by
    /// finite test/batch runs).
    Eof,
}

pub trait Reader: Send {
    fn next_block(&mut self) -> Result<ReadEvent>;
}

/// In-memory `Reader` over a pre-built list of blocks, for tests and the
/// CLI's one-shot file-replay mode.
pub struct VecReader {
    blocks: std::collections::VecDeque<RedoBlock>,
    switches: std::collections::HashMap<u64, u32>,
}

impl VecReader {
    pub fn new(blocks: Vec<RedoBlock>) -> Self {
        VecReader {
            blocks: blocks.into(),
            switches: std::collections::HashMap::new(),
        }
    }

    /// Mark that after block `after_block_number` is delivered, a log
    /// switch to `new_sequence` should be reported before the next block.
    pub fn with_switch_after(mut self, after_block_number: u64, new_sequence: u32) -> Self {
        self.switches.insert(after_block_number, new_sequence);
        self
    }
}

impl Reader for VecReader {
    fn next_block(&mut self) -> Result<ReadEvent> {
        match self.blocks.pop_front() {
            Some(block) => {
                if let Some(seq) = self.switches.remove(&block.number) {
                    // Report the switch before the block, so the next
                    // caller poll sees it first; requeue the block.
                    self.blocks.push_front(block);
                    return Ok(ReadEvent::LogSwitch { new_sequence: seq });
                }
                Ok(ReadEvent::Block(block))
            }
            None => Ok(ReadEvent::Eof),
        }
    }
}

/// Reads fixed-size blocks sequentially from a single on-disk redo log
/// file, used by the CLI's one-shot file-replay mode. Blocks 0 and 1
/// (the file header) are skipped; numbering starts at
/// [`FIRST_DATA_BLOCK`].
pub struct FileReader {
    file: File,
    block_size: u32,
    next_block_number: u64,
}

impl FileReader {
    pub fn open(path: &Path, block_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        Ok(FileReader {
            file,
            block_size,
            next_block_number: FIRST_DATA_BLOCK,
        })
    }
}

impl Reader for FileReader {
    fn next_block(&mut self) -> Result<ReadEvent> {
        let mut buf = vec![0u8; self.block_size as usize];
        let mut read = 0usize;
        while read < buf.len() {
            match self.file.read(&mut buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        if read == 0 {
            return Ok(ReadEvent::Eof);
        }
        buf.truncate(read);
        let number = self.next_block_number;
        self.next_block_number += 1;
        Ok(ReadEvent::Block(RedoBlock::new(number, buf)))
    }
}

/// Picks a `FileReader` seated at the start of `path`, as the CLI does for
/// each file named on the command line.
pub fn open_file(path: impl Into<PathBuf>, block_size: u32) -> Result<FileReader> {
    FileReader::open(&path.into(), block_size)
}
