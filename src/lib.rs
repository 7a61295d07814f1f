pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod meta;
pub mod metrics;
pub mod neural;
pub mod policy;
pub mod report;
pub mod task;

// Re-export commonly used types for convenience
pub use config::{Problem, TrainConfig};
pub use env::{
    ActionMask, BatchEnv, Environment, FjspEnv, Generator, JsspEnv, SchedulingInstance,
    SchedulingState,
};
pub use error::{Error, Result};
pub use meta::{
    EpochTrainer, MetaModel, MetaTrainer, MetaTrainerState, ParameterSnapshot, ParameterStore,
    ReptileConfig,
};
pub use task::{TaskConfig, TaskSampler, TaskSet};
