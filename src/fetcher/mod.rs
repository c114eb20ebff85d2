//! The fetcher state machine and its per-run state.

pub mod machine;
pub mod state;

pub use machine::{Fetcher, ShutdownHandle};
pub use state::{AssignedFetcherBuilder, FetcherBuilder, FetcherState};
