mod config;
mod interface;
mod memory;
mod slot;

pub use config::*;
pub use interface::*;
pub use memory::*;
pub use slot::*;
