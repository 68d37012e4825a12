//! Helpers for exercising the engine against real SQLite databases and a scriptable payment provider.
mod mock_provider;
#[cfg(feature = "sqlite")]
pub mod prepare_env;
#[cfg(feature = "sqlite")]
mod harness;

#[cfg(feature = "sqlite")]
pub use harness::TestHarness;
pub use mock_provider::{MockProvider, MOCK_SECRET};
