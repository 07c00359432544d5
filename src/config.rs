//! Parser configuration: block size, size caps, visibility cutoffs, flags.

use std::path::PathBuf;

use crate::error::{RedoError, Result};

/// Feature flags controlling router/decoder behavior (§6.4 of the design).
/// Modeled as named booleans rather than a bitflags-crate type: the flag
/// set is small and fixed, in the same spirit as the reference server's
/// hand-rolled `EngineType`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedoFlags {
    /// Skip table-dictionary lookups; route DML purely by obj/data_obj.
    pub schemaless: bool,
    /// Track DDL vectors (0x1801) instead of dropping them.
    pub track_ddl: bool,
    /// Decode LOB index/data opcodes (0x0A02/0x0A08/0x0A12/0x1301/0x1A06).
    pub experimental_lobs: bool,
    /// Allow `find_transaction` to create a transaction it never saw Begin for.
    pub show_incomplete_transactions: bool,
    /// On a fatal parse error, log and skip the offending LWN member instead
    /// of aborting the parser.
    pub ignore_data_errors: bool,
    /// Reserved for future schema-evolution handling; carried through
    /// unchanged, as no behavior in this core currently keys off it.
    pub adaptive_schema: bool,
}

/// Parser configuration, in the `Default`-plus-named-constructors style of
/// the reference server's `Config`/`GraniteConfig`.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Redo block size in bytes: 512, 1024, or 4096.
    pub block_size: u32,
    /// Per-transaction byte cap; exceeding it moves the xid to the skip list.
    pub transaction_size_max: u64,
    pub flags: RedoFlags,
    /// Commits at or below this SCN are purged silently, never flushed.
    pub first_data_scn: u64,
    /// Same cutoff, applied to transactions marked `system`.
    pub first_schema_scn: u64,
    /// How many completed LWNs between persisted checkpoint-state writes.
    pub checkpoint_interval_lwns: u32,
    /// Directory holding the persisted checkpoint-state file.
    pub data_dir: PathBuf,
    /// 0 = off. When > 0, the decoder additionally emits a `trace!` line
    /// per decoded vector, mirroring the original implementation's
    /// `dumpLogFile` verbosity knob.
    pub trace_level: u8,
    /// Selects the pre-12.1 vector header layout (field-lengths array at
    /// offset 24, no `con_id`/`flg_record`) instead of the 12.1+ layout
    /// (field-lengths array at offset 32). Defaults to the 12.1+ layout.
    pub pre_12_1_format: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            transaction_size_max: 1024 * 1024 * 1024,
            flags: RedoFlags::default(),
            first_data_scn: 0,
            first_schema_scn: 0,
            checkpoint_interval_lwns: 1,
            data_dir: PathBuf::from("./data"),
            trace_level: 0,
            pre_12_1_format: false,
        }
    }
}

impl ParserConfig {
    /// A config tuned for small fixture-driven tests: tiny block size,
    /// no size cap beyond what the test explicitly sets.
    pub fn for_tests() -> Self {
        Self {
            block_size: 512,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.block_size, 512 | 1024 | 4096) {
            return Err(RedoError::Config(format!(
                "block_size must be 512, 1024, or 4096, got {}",
                self.block_size
            )));
        }
        if self.transaction_size_max == 0 {
            return Err(RedoError::Config("transaction_size_max must be non-zero".into()));
        }
        Ok(())
    }
}
