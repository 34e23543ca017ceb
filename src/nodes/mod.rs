//! Node executors: triggers, conditions, actions, waits and timers, plus
//! the registry that maps a [`NodeKind`](crate::model::NodeKind) to its
//! executor.

pub mod actions;
pub mod conditions;
pub mod executor;
pub mod registry;
pub mod timers;
pub mod triggers;
pub mod util;
pub mod waits;

pub use executor::{
    validate_config, ConfigField, ConfigType, ExecutorEnv, NodeExecutor, NodeRunResult,
    NodeRunStatus, WaitRequest, DEFAULT_OUTPUT,
};
pub use registry::NodeExecutorRegistry;
pub use triggers::should_trigger;
pub use waits::TimeoutAction;
