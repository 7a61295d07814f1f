//! Reptile outer loop as explicit state plus step functions.
//!
//! Epochs are grouped into meta-epochs of `num_tasks` consecutive epochs.
//! Every epoch of a meta-epoch fine-tunes a fresh copy of the meta model on
//! one sampled task; the last epoch folds the adapted models back into the
//! meta model.
//!
//! ```text
//! e % n == 0   snapshot meta params, start meta-epoch
//! otherwise    restore meta params
//!              rebuild optimizer, load task selected[e % n]
//!   ... inner loop ...
//! end of e     push task snapshot
//! (e+1)%n==0   meta += alpha * mean(snapshot - meta), load, re-sample
//!              load task selected[(e+1) % n]
//! ```

use crate::env::Generator;
use crate::error::{Error, Result};
use crate::task::{TaskConfig, TaskSampler, TaskSet};

use super::params::{MetaModel, ParameterSnapshot};

/// Lower bound of the decayed outer step size
pub const ALPHA_FLOOR: f32 = 0.0001;

/// One-time learning-rate step decay factor
pub const LR_DECAY_FACTOR: f64 = 0.1;

/// Outer-loop hyper-parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ReptileConfig {
    /// Tasks per meta-epoch
    pub num_tasks: usize,
    /// Initial outer step size
    pub alpha: f32,
    /// Multiplicative decay applied to `alpha` at every epoch start
    pub alpha_decay: f32,
    pub min_size: usize,
    pub max_size: usize,
    /// Fraction of `max_epochs` at which the learning rate drops once
    pub sch_bar: f64,
    /// Task sampling strategy, only `"size"`
    pub data_type: String,
    pub seed: u64,
}

impl Default for ReptileConfig {
    fn default() -> Self {
        Self {
            num_tasks: 4,
            alpha: 0.99,
            alpha_decay: 0.999,
            min_size: 5,
            max_size: 15,
            sch_bar: 0.9,
            data_type: "size".to_string(),
            seed: 1234,
        }
    }
}

/// `max(alpha * decay, ALPHA_FLOOR)`
pub fn decay_alpha(alpha: f32, decay: f32) -> f32 {
    (alpha * decay).max(ALPHA_FLOOR)
}

/// Epoch index at which the one-time learning-rate decay applies
pub fn lr_decay_epoch(sch_bar: f64, max_epochs: usize) -> usize {
    (sch_bar * max_epochs as f64).floor() as usize
}

/// Cross-epoch state of the Reptile loop
#[derive(Debug, Clone)]
pub struct MetaTrainerState {
    config: ReptileConfig,
    sampler: TaskSampler,
    meta_parameters: Option<ParameterSnapshot>,
    selected_tasks: Vec<TaskConfig>,
    task_weights: Vec<f32>,
    task_snapshots: Vec<ParameterSnapshot>,
    alpha: f32,
    /// Selection drawn at fit start or meta-epoch end and not yet consumed
    fresh_selection: bool,
    /// Epoch started and not yet ended
    open_epoch: Option<usize>,
}

impl MetaTrainerState {
    /// Validate the configuration and build the task sampler. Fails before
    /// any state exists on an unsupported sampling strategy.
    pub fn new(config: ReptileConfig) -> Result<Self> {
        if config.num_tasks == 0 {
            return Err(Error::config("num_tasks", "must be positive"));
        }
        if !(config.alpha > 0.0) {
            return Err(Error::config("alpha", "must be positive"));
        }
        if !(config.alpha_decay > 0.0 && config.alpha_decay <= 1.0) {
            return Err(Error::config("alpha_decay", "must be in (0, 1]"));
        }
        if !(config.sch_bar > 0.0 && config.sch_bar <= 1.0) {
            return Err(Error::config("sch_bar", "must be in (0, 1]"));
        }

        let task_set = TaskSet::new(&config.data_type, config.min_size, config.max_size)?;
        let sampler = TaskSampler::new(task_set, config.seed);

        Ok(Self {
            alpha: config.alpha,
            config,
            sampler,
            meta_parameters: None,
            selected_tasks: Vec::new(),
            task_weights: Vec::new(),
            task_snapshots: Vec::new(),
            fresh_selection: false,
            open_epoch: None,
        })
    }

    pub fn config(&self) -> &ReptileConfig {
        &self.config
    }

    pub fn num_tasks(&self) -> usize {
        self.config.num_tasks
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn meta_parameters(&self) -> Option<&ParameterSnapshot> {
        self.meta_parameters.as_ref()
    }

    pub fn selected_tasks(&self) -> &[TaskConfig] {
        &self.selected_tasks
    }

    pub fn task_weights(&self) -> &[f32] {
        &self.task_weights
    }

    pub fn task_snapshots(&self) -> &[ParameterSnapshot] {
        &self.task_snapshots
    }

    /// Meta-epoch an epoch index belongs to
    pub fn meta_epoch(&self, epoch: usize) -> usize {
        epoch / self.config.num_tasks
    }

    fn resample(&mut self) {
        let sampled = self.sampler.sample(self.config.num_tasks);
        self.selected_tasks = sampled.tasks;
        self.task_weights = sampled.weights;
        self.fresh_selection = true;
    }

    fn task_at(&self, epoch: usize) -> Result<TaskConfig> {
        let index = epoch % self.config.num_tasks;
        self.selected_tasks.get(index).copied().ok_or_else(|| {
            Error::InvalidTransition(format!(
                "no task selected for slot {index}; call on_fit_start first"
            ))
        })
    }
}

/// What happened at the start of an epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochStart {
    pub epoch: usize,
    pub meta_epoch: usize,
    pub task: TaskConfig,
    /// Generator capacity after loading the task, if it has one
    pub capacity: Option<u32>,
    /// Outer step size after this epoch's decay
    pub alpha: f32,
    /// Learning rate of the rebuilt optimizer
    pub learning_rate: f64,
    /// Meta parameters were snapshotted from the live model
    pub new_meta_epoch: bool,
    /// The one-time learning-rate decay was applied
    pub lr_decayed: bool,
}

/// What happened at the end of an epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochEnd {
    pub epoch: usize,
    /// Outer-loop update ran and was loaded into the model
    pub aggregated: bool,
    /// A new task selection was drawn for the next meta-epoch
    pub resampled: bool,
    /// Task loaded into the generator for the next epoch
    pub next_task: TaskConfig,
    /// Task snapshots collected in the current meta-epoch
    pub num_snapshots: usize,
}

/// Sample the first task selection, pinning slot 0 to the generator's
/// current task so the first epoch trains on the configured problem.
pub fn on_fit_start<G: Generator>(mut state: MetaTrainerState, generator: &G) -> MetaTrainerState {
    state.resample();
    if let Some(first) = state.selected_tasks.first_mut() {
        *first = generator.task();
    }
    state.open_epoch = None;

    tracing::info!(
        "Meta-training over {} task sizes, {} tasks per meta-epoch",
        state.sampler.task_set().len(),
        state.config.num_tasks
    );
    state
}

/// Epoch-start protocol: decay alpha, snapshot or restore the meta
/// parameters, rebuild the optimizer and load this epoch's task.
pub fn on_epoch_start<M: MetaModel, G: Generator>(
    mut state: MetaTrainerState,
    epoch: usize,
    max_epochs: usize,
    model: &mut M,
    generator: &mut G,
) -> Result<(MetaTrainerState, EpochStart)> {
    if let Some(open) = state.open_epoch {
        return Err(Error::InvalidTransition(format!(
            "epoch {epoch} started before epoch {open} ended"
        )));
    }

    state.alpha = decay_alpha(state.alpha, state.config.alpha_decay);

    let num_tasks = state.config.num_tasks;
    let new_meta_epoch = epoch % num_tasks == 0;
    if new_meta_epoch {
        state.meta_parameters = Some(model.parameters());
        state.task_snapshots.clear();
        if !state.fresh_selection {
            state.resample();
        }
        state.fresh_selection = false;

        tracing::info!(
            "Meta-epoch {} (epoch {}): tasks [{}]",
            state.meta_epoch(epoch),
            epoch,
            state
                .selected_tasks
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    } else {
        let meta = state.meta_parameters.as_ref().ok_or_else(|| {
            Error::InvalidTransition(format!(
                "epoch {epoch} is inside a meta-epoch that never started"
            ))
        })?;
        model.load_parameters(meta)?;
    }

    let mut learning_rate = model.learning_rate();
    let lr_decayed = epoch + 1 == lr_decay_epoch(state.config.sch_bar, max_epochs);
    if lr_decayed {
        learning_rate *= LR_DECAY_FACTOR;
        tracing::info!("Learning rate decayed to {:.2e} at epoch {}", learning_rate, epoch);
    }
    model.rebuild_optimizer(learning_rate);

    let task = state.task_at(epoch)?;
    generator.apply(&task);
    let capacity = generator.capacity();
    match capacity {
        Some(capacity) => tracing::info!("Epoch {}: task {} capacity {}", epoch, task, capacity),
        None => tracing::info!("Epoch {}: task {}", epoch, task),
    }

    state.open_epoch = Some(epoch);
    let event = EpochStart {
        epoch,
        meta_epoch: state.meta_epoch(epoch),
        task,
        capacity,
        alpha: state.alpha,
        learning_rate,
        new_meta_epoch,
        lr_decayed,
    };
    Ok((state, event))
}

/// Epoch-end protocol: record the adapted parameters, aggregate at the
/// meta-epoch boundary and load the next task.
pub fn on_epoch_end<M: MetaModel, G: Generator>(
    mut state: MetaTrainerState,
    epoch: usize,
    model: &mut M,
    generator: &mut G,
) -> Result<(MetaTrainerState, EpochEnd)> {
    if state.open_epoch != Some(epoch) {
        return Err(Error::InvalidTransition(format!(
            "epoch {epoch} ended without a matching start"
        )));
    }

    state.task_snapshots.push(model.parameters());

    let num_tasks = state.config.num_tasks;
    let boundary = (epoch + 1) % num_tasks == 0;
    if boundary {
        let mut meta = state.meta_parameters.clone().ok_or_else(|| {
            Error::InvalidTransition("outer-loop update without meta parameters".to_string())
        })?;
        meta.reptile_update(&state.task_snapshots, state.alpha)?;
        model.load_parameters(&meta)?;
        state.meta_parameters = Some(meta);

        tracing::info!(
            "Meta-epoch {} aggregated {} task snapshots with alpha {:.4}",
            state.meta_epoch(epoch),
            state.task_snapshots.len(),
            state.alpha
        );
        state.resample();
    }

    let next_task = state.task_at(epoch + 1)?;
    generator.apply(&next_task);
    state.open_epoch = None;

    let event = EpochEnd {
        epoch,
        aggregated: boundary,
        resampled: boundary,
        next_task,
        num_snapshots: state.task_snapshots.len(),
    };
    Ok((state, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{JsspGenerator, RoutingGenerator};
    use crate::meta::params::{ParamTensor, ParameterStore};

    /// Single-weight model recording every optimizer rebuild
    struct ToyModel {
        weight: f32,
        lr: f64,
        rebuilds: Vec<f64>,
    }

    impl ToyModel {
        fn new() -> Self {
            Self {
                weight: 0.0,
                lr: 0.01,
                rebuilds: Vec::new(),
            }
        }
    }

    impl ParameterStore for ToyModel {
        fn parameters(&self) -> ParameterSnapshot {
            let mut s = ParameterSnapshot::new();
            s.insert("w", ParamTensor::vector(vec![self.weight]));
            s
        }

        fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
            let w = snapshot
                .get("w")
                .ok_or_else(|| Error::mismatch("w", "missing"))?;
            self.weight = w.values[0];
            Ok(())
        }
    }

    impl MetaModel for ToyModel {
        fn learning_rate(&self) -> f64 {
            self.lr
        }

        fn rebuild_optimizer(&mut self, learning_rate: f64) {
            self.lr = learning_rate;
            self.rebuilds.push(learning_rate);
        }
    }

    fn config(num_tasks: usize, min_size: usize, max_size: usize) -> ReptileConfig {
        ReptileConfig {
            num_tasks,
            min_size,
            max_size,
            seed: 11,
            ..ReptileConfig::default()
        }
    }

    #[test]
    fn test_decay_alpha_floor() {
        assert!((decay_alpha(0.99, 0.999) - 0.98901).abs() < 1e-6);
        assert_eq!(decay_alpha(0.0002, 0.1), ALPHA_FLOOR);
        assert_eq!(decay_alpha(ALPHA_FLOOR, 0.5), ALPHA_FLOOR);
    }

    #[test]
    fn test_unsupported_data_type_fails_at_construction() {
        let config = ReptileConfig {
            data_type: "capacity".to_string(),
            ..ReptileConfig::default()
        };
        assert!(matches!(
            MetaTrainerState::new(config),
            Err(Error::UnsupportedConfiguration(_))
        ));
        assert!(MetaTrainerState::new(config_with_tasks(0)).is_err());
    }

    fn config_with_tasks(num_tasks: usize) -> ReptileConfig {
        ReptileConfig {
            num_tasks,
            ..ReptileConfig::default()
        }
    }

    #[test]
    fn test_fit_start_pins_generator_task() {
        let generator = JsspGenerator::default();
        let state = MetaTrainerState::new(config(4, 5, 15)).unwrap();
        let state = on_fit_start(state, &generator);
        assert_eq!(state.selected_tasks().len(), 4);
        assert_eq!(state.selected_tasks()[0], TaskConfig::new(10));
        assert_eq!(state.task_weights().len(), 4);
    }

    #[test]
    fn test_snapshot_and_aggregation_epochs() {
        let mut model = ToyModel::new();
        let mut generator = JsspGenerator::default();
        let mut state = on_fit_start(MetaTrainerState::new(config(4, 5, 15)).unwrap(), &generator);

        let mut starts = Vec::new();
        let mut aggregations = Vec::new();
        for epoch in 0..8 {
            let (next, start) = on_epoch_start(state, epoch, 100, &mut model, &mut generator).unwrap();
            state = next;
            if start.new_meta_epoch {
                starts.push(epoch);
            }
            assert_eq!(generator.task(), start.task);

            model.weight += 1.0;

            let (next, end) = on_epoch_end(state, epoch, &mut model, &mut generator).unwrap();
            state = next;
            if end.aggregated {
                assert!(end.resampled);
                assert_eq!(end.num_snapshots, 4);
                aggregations.push(epoch);
            }
            assert_eq!(generator.task(), end.next_task);
        }

        assert_eq!(starts, vec![0, 4]);
        assert_eq!(aggregations, vec![3, 7]);
    }

    #[test]
    fn test_every_task_starts_from_meta_parameters() {
        let mut model = ToyModel::new();
        model.weight = 2.0;
        let mut generator = JsspGenerator::default();
        let mut state = on_fit_start(MetaTrainerState::new(config(4, 5, 15)).unwrap(), &generator);

        let mut alpha = 0.0;
        for epoch in 0..4 {
            let (next, start) = on_epoch_start(state, epoch, 100, &mut model, &mut generator).unwrap();
            state = next;
            assert_eq!(model.weight, 2.0);
            alpha = start.alpha;

            // adapted weights 3, 4, 5, 6
            model.weight += (epoch + 1) as f32;

            let (next, _) = on_epoch_end(state, epoch, &mut model, &mut generator).unwrap();
            state = next;
        }

        // mean delta 2.5 from the meta weight of 2.0
        let expected = 2.0 + alpha * 2.5;
        assert!((model.weight - expected).abs() < 1e-5);
        let meta = state.meta_parameters().unwrap();
        assert!((meta.get("w").unwrap().values[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_identical_snapshots_keep_meta_model() {
        let mut model = ToyModel::new();
        model.weight = 0.75;
        let mut generator = JsspGenerator::default();
        let mut state = on_fit_start(MetaTrainerState::new(config(3, 5, 15)).unwrap(), &generator);

        for epoch in 0..3 {
            let (next, _) = on_epoch_start(state, epoch, 10, &mut model, &mut generator).unwrap();
            let (next, _) = on_epoch_end(next, epoch, &mut model, &mut generator).unwrap();
            state = next;
        }
        assert_eq!(model.weight, 0.75);
        assert_eq!(state.task_snapshots().len(), 3);
    }

    #[test]
    fn test_single_size_task_set() {
        let mut model = ToyModel::new();
        let mut generator = RoutingGenerator::default();
        generator.apply(&TaskConfig::new(10));
        let mut state = on_fit_start(MetaTrainerState::new(config(4, 10, 10)).unwrap(), &generator);

        for epoch in 0..4 {
            let (next, start) = on_epoch_start(state, epoch, 100, &mut model, &mut generator).unwrap();
            assert_eq!(start.task, TaskConfig::new(10));
            assert_eq!(start.capacity, Some(20));
            let (next, _) = on_epoch_end(next, epoch, &mut model, &mut generator).unwrap();
            state = next;
        }

        assert!(state.selected_tasks().iter().all(|t| *t == TaskConfig::new(10)));
        assert!(state.selected_tasks().iter().all(|t| t.capacity() == 20));
    }

    #[test]
    fn test_learning_rate_decays_once() {
        let mut model = ToyModel::new();
        let mut generator = JsspGenerator::default();
        let config = ReptileConfig {
            sch_bar: 0.5,
            ..config(2, 5, 15)
        };
        let mut state = on_fit_start(MetaTrainerState::new(config).unwrap(), &generator);

        let mut decayed = Vec::new();
        for epoch in 0..10 {
            let (next, start) = on_epoch_start(state, epoch, 10, &mut model, &mut generator).unwrap();
            if start.lr_decayed {
                decayed.push(epoch);
            }
            let (next, _) = on_epoch_end(next, epoch, &mut model, &mut generator).unwrap();
            state = next;
        }

        assert_eq!(decayed, vec![4]);
        assert_eq!(model.rebuilds.len(), 10);
        assert!(model.rebuilds[..4].iter().all(|&lr| (lr - 0.01).abs() < 1e-12));
        assert!(model.rebuilds[4..].iter().all(|&lr| (lr - 0.001).abs() < 1e-12));
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut model = ToyModel::new();
        let mut generator = JsspGenerator::default();
        let state = on_fit_start(MetaTrainerState::new(config(4, 5, 15)).unwrap(), &generator);

        assert!(matches!(
            on_epoch_end(state.clone(), 0, &mut model, &mut generator),
            Err(Error::InvalidTransition(_))
        ));
        assert!(matches!(
            on_epoch_start(state, 1, 10, &mut model, &mut generator),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_alpha_decays_every_epoch() {
        let mut model = ToyModel::new();
        let mut generator = JsspGenerator::default();
        let mut state = on_fit_start(MetaTrainerState::new(config(2, 5, 15)).unwrap(), &generator);

        let mut expected = 0.99f32;
        for epoch in 0..4 {
            let (next, start) = on_epoch_start(state, epoch, 10, &mut model, &mut generator).unwrap();
            expected = decay_alpha(expected, 0.999);
            assert!((start.alpha - expected).abs() < 1e-7);
            let (next, _) = on_epoch_end(next, epoch, &mut model, &mut generator).unwrap();
            state = next;
        }
    }
}
