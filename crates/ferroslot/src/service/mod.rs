mod generator;
mod state;
#[cfg(test)]
mod tests;

pub use generator::*;
pub use state::*;
