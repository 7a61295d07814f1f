//! Task distribution for meta-training: task configurations, the enumerated
//! task set and the sampler that draws a batch of tasks per meta-epoch.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};

/// Capacity used for every task smaller than [`CAPACITY_SIZE_THRESHOLD`]
pub const BASE_CAPACITY: u32 = 20;

/// Task size from which capacity grows with the size
pub const CAPACITY_SIZE_THRESHOLD: usize = 20;

/// An immutable task configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskConfig {
    /// Problem size (number of jobs or number of customer locations)
    pub size: usize,
}

impl TaskConfig {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Vehicle capacity derived from the size: `ceil(30 + size / 5)` for
    /// `size >= 20`, otherwise 20.
    pub fn capacity(&self) -> u32 {
        if self.size >= CAPACITY_SIZE_THRESHOLD {
            (30.0 + self.size as f64 / 5.0).ceil() as u32
        } else {
            BASE_CAPACITY
        }
    }
}

impl std::fmt::Display for TaskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},)", self.size)
    }
}

/// Enumerated set of tasks the sampler draws from
#[derive(Debug, Clone)]
pub struct TaskSet {
    tasks: Vec<TaskConfig>,
}

impl TaskSet {
    /// Build the task set for a sampling strategy. Only `"size"` is supported.
    pub fn new(data_type: &str, min_size: usize, max_size: usize) -> Result<Self> {
        if data_type != "size" {
            return Err(Error::UnsupportedConfiguration(format!(
                "task sampling strategy '{data_type}' (only 'size' is supported)"
            )));
        }
        if min_size > max_size {
            return Err(Error::UnsupportedConfiguration(format!(
                "empty task set: min_size {min_size} > max_size {max_size}"
            )));
        }

        let tasks = (min_size..=max_size).map(TaskConfig::new).collect();
        Ok(Self { tasks })
    }

    pub fn tasks(&self) -> &[TaskConfig] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task: &TaskConfig) -> bool {
        self.tasks.contains(task)
    }
}

/// A batch of tasks drawn for one meta-epoch
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTasks {
    pub tasks: Vec<TaskConfig>,
    /// Per-task weights, `softmax` over a uniform vector. Always uniform today;
    /// kept so non-uniform task weighting can be wired in later.
    pub weights: Vec<f32>,
}

/// Uniform with-replacement sampler over a [`TaskSet`]
#[derive(Debug, Clone)]
pub struct TaskSampler {
    task_set: TaskSet,
    rng: StdRng,
}

impl TaskSampler {
    pub fn new(task_set: TaskSet, seed: u64) -> Self {
        Self {
            task_set,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn task_set(&self) -> &TaskSet {
        &self.task_set
    }

    /// Draw `count` tasks uniformly at random, with replacement
    pub fn sample(&mut self, count: usize) -> SampledTasks {
        let tasks: Vec<TaskConfig> = (0..count)
            .filter_map(|_| self.task_set.tasks.choose(&mut self.rng).copied())
            .collect();
        let weights = softmax(&vec![1.0; count]);

        SampledTasks { tasks, weights }
    }
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
