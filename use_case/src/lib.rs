pub mod lookup;
pub mod offline;
