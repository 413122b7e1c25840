//! Build execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod workspace;

pub use engine::{EventEmitter, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::JobExecutor;
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
pub use workspace::{JobWorkspace, Workspace};
