//! Schema/PDB metadata collaborator consulted by the router's Schema and
//! PDB filters (§4.3). Resolving an `obj` id to a table and its
//! classification flags means querying the database's own dictionary,
//! which is out of scope for this crate; `NullMetadata` is the no-op
//! stand-in used when nothing else is wired in.

use std::collections::HashMap;

/// Classification flags a dictionary attaches to a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub system_table: bool,
    pub debug_table: bool,
}

/// Consulted once per DML vector to gate the Schema filter and classify
/// the owning transaction as `system`/`shutdown`.
pub trait SchemaMetadata: Send {
    /// The PDB this parser instance is scoped to. `None` (the default)
    /// disables the PDB filter entirely.
    fn con_id(&self) -> Option<u16> {
        None
    }

    /// Resolve `obj` to its table's classification. `None` means the
    /// table is unknown to the dictionary, so the vector is dropped.
    fn lookup_table(&self, obj: u32) -> Option<TableOptions>;
}

/// Default collaborator used when no real dictionary is configured: every
/// table resolves with no classification, and the PDB filter never fires.
#[derive(Debug, Default)]
pub struct NullMetadata;

impl SchemaMetadata for NullMetadata {
    fn lookup_table(&self, _obj: u32) -> Option<TableOptions> {
        Some(TableOptions::default())
    }
}

/// A fixed `obj -> options` table plus an optional PDB scope, useful for
/// tests and small deployments that don't need a live dictionary.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    pub con_id: Option<u16>,
    pub tables: HashMap<u32, TableOptions>,
}

impl SchemaMetadata for StaticMetadata {
    fn con_id(&self) -> Option<u16> {
        self.con_id
    }

    fn lookup_table(&self, obj: u32) -> Option<TableOptions> {
        self.tables.get(&obj).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_metadata_resolves_every_table_with_no_flags() {
        let meta = NullMetadata;
        let options = meta.lookup_table(42).unwrap();
        assert!(!options.system_table);
        assert!(!options.debug_table);
        assert!(meta.con_id().is_none());
    }

    #[test]
    fn static_metadata_reports_configured_tables_and_pdb() {
        let mut meta = StaticMetadata { con_id: Some(3), ..Default::default() };
        meta.tables.insert(42, TableOptions { system_table: true, debug_table: false });
        assert_eq!(meta.con_id(), Some(3));
        assert!(meta.lookup_table(42).unwrap().system_table);
        assert!(meta.lookup_table(99).is_none());
    }
}
