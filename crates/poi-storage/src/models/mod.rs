pub mod bin_entry;

pub use bin_entry::{BinEntry, NewBinEntry, validate_pan};
