pub mod config;
pub mod error;
pub mod inflight;
pub mod limiter;
pub mod liveness;
pub mod notifier;
pub mod source;
pub mod stage;
pub mod storage;
pub mod worker;
