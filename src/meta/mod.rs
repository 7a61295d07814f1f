//! Reptile meta-training
//!
//! - `params`: parameter snapshots and the model/optimizer traits
//! - `reptile`: outer-loop state and epoch step functions
//! - `trainer`: host loop combining the step functions with an inner loop

pub mod params;
pub mod reptile;
pub mod trainer;

pub use params::{MetaModel, ParamTensor, ParameterSnapshot, ParameterStore};
pub use reptile::{
    decay_alpha, lr_decay_epoch, on_epoch_end, on_epoch_start, on_fit_start, EpochEnd,
    EpochStart, MetaTrainerState, ReptileConfig, ALPHA_FLOOR, LR_DECAY_FACTOR,
};
pub use trainer::{EpochRecord, EpochStats, EpochTrainer, MetaTrainer};
