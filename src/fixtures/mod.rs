pub mod provider;
pub mod sportsdb;

pub use provider::{FetchError, FixtureProvider};
pub use sportsdb::TheSportsDb;
