// src/process/mod.rs
pub mod date_parser;
pub mod join;
pub mod record;
pub mod table;
pub mod unpack;
pub mod utils;

pub use join::{join, JoinReport};
pub use record::{Column, ColumnSet, HoldingRecord};
pub use unpack::{unpack, TableSet};
