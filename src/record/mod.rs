//! Record storage.
//!
//! - [`RecordStore`] - Insert/update/remove over sorted, chained blocks
//! - [`RecordBlock`] - Decoded contents of one block

mod record_block;
mod record_store;

pub use record_block::RecordBlock;
pub use record_store::{RecordSplit, RecordStore};
