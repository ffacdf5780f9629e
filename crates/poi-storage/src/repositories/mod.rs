pub mod bin_table;

pub use bin_table::{BinTableStore, SqliteBinTableStore};
