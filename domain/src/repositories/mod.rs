mod cache;
mod carrier;
mod network;

pub use cache::*;
pub use carrier::*;
pub use network::*;
