pub mod finalize;
pub mod period;
pub mod service;
