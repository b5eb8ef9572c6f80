//! Common types and utilities shared across blinkdb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`DbConfig`]
//! - Error types
//! - Identifiers (BlockNum, TxnId)
//! - Little-endian byte cursors used by every on-disk format

mod block_num;
pub mod codec;
pub mod config;
pub mod error;
mod txn_id;

pub use block_num::BlockNum;
pub use config::DbConfig;
pub use error::{Error, Result};
pub use txn_id::{LogId, TxnId};
