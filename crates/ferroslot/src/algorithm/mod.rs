mod classic;
mod flagged;
mod interface;
mod sequence;
mod strategy;
mod window;

pub use classic::*;
pub use flagged::*;
pub use interface::*;
pub use sequence::*;
pub use strategy::*;
pub use window::*;
