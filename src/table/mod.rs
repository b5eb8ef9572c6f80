//! Tables over the index and record layers.

#[allow(clippy::module_inception)]
mod table;

pub use table::Table;
