pub mod provider;
pub mod state;
pub mod traits;
pub mod units;
