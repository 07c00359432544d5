//! Transaction assembly: buffers, the in-flight transaction table, and the
//! router that turns paired vectors into transaction mutations.

pub mod lob;
pub mod metadata;
pub mod router;
pub mod transaction;

pub use lob::{LobCtx, LobData, OrphanedLobs};
pub use metadata::{NullMetadata, SchemaMetadata, StaticMetadata, TableOptions};
pub use router::TransactionRouter;
pub use transaction::{Transaction, TransactionBuffer};
