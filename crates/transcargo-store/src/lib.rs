//! TransCargo Store: SQLite persistence for the consent ledger, leads,
//! audit trail and site content, plus a TTL cache.

mod audit;
pub mod cache;
mod consents;
mod content;
mod leads;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use cache::{Cache, MemoryCache};
pub use content::new_seo_metadata;
pub use sqlite::{SqliteStore, StoreTx};
pub use types::*;
