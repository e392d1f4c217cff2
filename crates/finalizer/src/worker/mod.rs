mod runner;
mod state;

pub use runner::{FinalizationWorker, WorkerConfig};
pub use state::WorkerState;
