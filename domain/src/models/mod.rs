mod offline;
mod phone;
pub mod primitives;

pub use offline::*;
pub use phone::*;
