pub mod diff;
pub mod openligadb;
pub mod provider;

pub use diff::{diff, MatchEvent};
pub use openligadb::OpenLigaDb;
pub use provider::{MatchProvider, ProviderError};
