pub mod api;
pub mod cache;
pub mod custody;
pub mod error;
pub mod ledger;
pub mod notifier;
pub mod orchestrator;
pub mod pool;
pub mod reconciler;
pub mod settings;
pub mod supply;
pub mod types;
pub mod worker;
