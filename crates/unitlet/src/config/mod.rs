pub mod cli;
pub mod provider;

pub use cli::*;
pub use provider::*;
