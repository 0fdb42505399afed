//! Errors and the fatal-assertion machinery.
//!
//! Configuration shape problems are ordinary `Result` errors because the
//! caller can fix them. Everything after construction is a contract check:
//! a violation means the program is wrong, so the router logs through the
//! configured hook and `tracing`, then panics.

use thiserror::Error;

use crate::options::TaskHandle;

/// Configuration-shape errors reported by the router constructors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one task is required")]
    NoTasks,
    #[error("task count {0} exceeds the 32-task dispatch limit")]
    TooManyTasks(usize),
    #[error("task `{0}` has no modules")]
    EmptyTask(&'static str),
    #[error("task `{0}` has a zero-capacity queue")]
    ZeroQueueCapacity(&'static str),
    #[error("tasks `{0}` and `{1}` share the handle {2:?}")]
    DuplicateTaskHandle(&'static str, &'static str, TaskHandle),
    #[error("the event type range is empty")]
    EmptyTypeRange,
    #[error("first event type {0} must be non-negative")]
    NegativeFirstType(i32),
    #[error("the cooperative backend requires exactly one task, got {0}")]
    CooperativeTaskCount(usize),
}

/// Contract check against a router; aborts through [`Router::fatal`] with the
/// formatted message when the condition does not hold.
macro_rules! router_assert {
    ($router:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            $router.fatal(core::format_args!($($arg)+));
        }
    };
}

pub(crate) use router_assert;
