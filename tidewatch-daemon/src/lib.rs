//! Long-running reconciliation loop: config reload, cycle dispatch onto the
//! blocking pool, interval sleep and signal-driven shutdown.

mod error;
pub mod paths;
mod runtime;

pub use error::DaemonError;
pub use runtime::{
    init_tracing, reconcile_loop, run, start_blocking, Backoff, LoopSettings, LoopStats,
};
