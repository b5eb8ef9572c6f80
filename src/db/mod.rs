//! The database layer: transactions, catalog, integrity checks and
//! recovery on top of tables.
//!
//! # Components
//! - [`Database`] - One open database directory
//! - [`RecoveryReport`] - What a recovery run did

mod catalog_view;
mod database;
mod recovery;

pub use catalog_view::CatalogView;
pub use database::{Database, BACKUP_FILE, DATA_FILE};
pub use recovery::RecoveryReport;
