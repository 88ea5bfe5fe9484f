pub mod executor;
pub mod runner;

pub use executor::{Executor, MockExecutor};
pub use runner::{TestRunner, TrialSequence};
