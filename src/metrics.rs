//! Metrics for meta-training and policy evaluation

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Training metrics tracker
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Mean episode reward per epoch
    pub rewards: MovingAverage,
    /// Mean makespan per epoch
    pub makespans: MovingAverage,
    /// Policy loss per epoch
    pub losses: MovingAverage,
    /// Mean makespan per task size
    pub task_makespans: BTreeMap<usize, MovingAverage>,
    /// Current epoch
    pub epoch: usize,
    /// Completed meta-epochs (outer-loop updates)
    pub meta_updates: usize,
    /// Total training episodes
    pub total_episodes: usize,
    window_size: usize,
    start_time: Instant,
    last_log_time: Instant,
    epochs_since_log: usize,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        let now = Instant::now();
        Self {
            rewards: MovingAverage::new(window_size),
            makespans: MovingAverage::new(window_size),
            losses: MovingAverage::new(window_size),
            task_makespans: BTreeMap::new(),
            epoch: 0,
            meta_updates: 0,
            total_episodes: 0,
            window_size,
            start_time: now,
            last_log_time: now,
            epochs_since_log: 0,
        }
    }

    /// Record the outcome of one inner-loop epoch on a task
    pub fn record_epoch(
        &mut self,
        epoch: usize,
        task_size: usize,
        mean_reward: f32,
        mean_makespan: f32,
        loss: f32,
        episodes: usize,
    ) {
        self.epoch = epoch;
        self.epochs_since_log += 1;
        self.rewards.push(mean_reward);
        self.makespans.push(mean_makespan);
        self.losses.push(loss);
        self.total_episodes += episodes;
        self.task_makespans
            .entry(task_size)
            .or_insert_with(|| MovingAverage::new(self.window_size))
            .push(mean_makespan);
    }

    pub fn record_meta_update(&mut self) {
        self.meta_updates += 1;
    }

    /// Get training duration in seconds
    pub fn training_duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn episodes_per_second(&self) -> f64 {
        let duration = self.training_duration_secs();
        if duration > 0.0 {
            self.total_episodes as f64 / duration
        } else {
            0.0
        }
    }

    /// Epochs recorded since the last console log
    pub fn epochs_since_log(&self) -> usize {
        self.epochs_since_log
    }

    /// Log current metrics to console
    pub fn log_to_console(&mut self) {
        let now = Instant::now();
        let elapsed_since_log = now.duration_since(self.last_log_time).as_secs_f64();
        let epochs_per_second = if elapsed_since_log > 0.0 {
            self.epochs_since_log as f64 / elapsed_since_log
        } else {
            0.0
        };

        tracing::info!(
            "Epoch {} | Meta updates {} | Episodes {} | EPS {:.1} | Epochs/s {:.2}",
            self.epoch,
            self.meta_updates,
            self.total_episodes,
            self.episodes_per_second(),
            epochs_per_second
        );
        tracing::info!(
            "  Reward={:.2}, makespan={:.1}, loss={:.4}",
            self.rewards.average(),
            self.makespans.average(),
            self.losses.average()
        );
        for (size, makespan) in &self.task_makespans {
            tracing::debug!("  Task size {}: makespan={:.1}", size, makespan.average());
        }

        self.last_log_time = now;
        self.epochs_since_log = 0;
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Makespan statistics of one policy over an evaluation set
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    /// Number of evaluation episodes
    pub num_episodes: usize,
    pub total_makespan: f64,
    pub min_makespan: Option<u32>,
    pub max_makespan: Option<u32>,
    /// Total agent decisions across all episodes
    pub total_steps: usize,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_episode(&mut self, makespan: u32, steps: usize) {
        self.num_episodes += 1;
        self.total_makespan += makespan as f64;
        self.total_steps += steps;
        self.min_makespan = Some(self.min_makespan.map_or(makespan, |m| m.min(makespan)));
        self.max_makespan = Some(self.max_makespan.map_or(makespan, |m| m.max(makespan)));
    }

    pub fn avg_makespan(&self) -> f64 {
        if self.num_episodes > 0 {
            self.total_makespan / self.num_episodes as f64
        } else {
            0.0
        }
    }

    /// Average reward (negative makespan)
    pub fn avg_reward(&self) -> f64 {
        -self.avg_makespan()
    }

    pub fn avg_steps(&self) -> f64 {
        if self.num_episodes > 0 {
            self.total_steps as f64 / self.num_episodes as f64
        } else {
            0.0
        }
    }

    /// Relative gap of this policy's mean makespan to `reference`
    pub fn gap_to(&self, reference: &EvaluationMetrics) -> f64 {
        let base = reference.avg_makespan();
        if base > 0.0 {
            (self.avg_makespan() - base) / base
        } else {
            0.0
        }
    }

    /// Print summary
    pub fn print_summary(&self, name: &str) {
        tracing::info!(
            "{:>8}: episodes={} avg_makespan={:.1} min={} max={} avg_steps={:.1}",
            name,
            self.num_episodes,
            self.avg_makespan(),
            self.min_makespan.unwrap_or(0),
            self.max_makespan.unwrap_or(0),
            self.avg_steps()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let mut avg = MovingAverage::new(3);

        avg.push(1.0);
        assert!((avg.average() - 1.0).abs() < 1e-6);

        avg.push(2.0);
        assert!((avg.average() - 1.5).abs() < 1e-6);

        avg.push(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-6);

        avg.push(4.0); // Pushes out 1.0
        assert!((avg.average() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_training_metrics_per_task() {
        let mut metrics = TrainingMetrics::new(10);
        metrics.record_epoch(0, 10, -50.0, 50.0, 0.1, 16);
        metrics.record_epoch(1, 12, -70.0, 70.0, 0.2, 16);
        metrics.record_epoch(2, 10, -40.0, 40.0, 0.3, 16);
        metrics.record_meta_update();

        assert_eq!(metrics.epoch, 2);
        assert_eq!(metrics.total_episodes, 48);
        assert_eq!(metrics.meta_updates, 1);
        assert!((metrics.task_makespans[&10].average() - 45.0).abs() < 1e-6);
        assert!((metrics.makespans.average() - 160.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_log_resets_epoch_counter() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0, 10, -50.0, 50.0, 0.1, 16);
        metrics.record_epoch(1, 10, -45.0, 45.0, 0.1, 16);
        assert_eq!(metrics.epochs_since_log(), 2);

        metrics.log_to_console();
        assert_eq!(metrics.epochs_since_log(), 0);

        metrics.record_epoch(2, 12, -60.0, 60.0, 0.1, 16);
        assert_eq!(metrics.epochs_since_log(), 1);
    }

    #[test]
    fn test_evaluation_metrics() {
        let mut metrics = EvaluationMetrics::new();

        metrics.record_episode(40, 10);
        metrics.record_episode(60, 12);

        assert_eq!(metrics.num_episodes, 2);
        assert!((metrics.avg_makespan() - 50.0).abs() < 1e-9);
        assert!((metrics.avg_reward() + 50.0).abs() < 1e-9);
        assert_eq!(metrics.min_makespan, Some(40));
        assert_eq!(metrics.max_makespan, Some(60));
        assert!((metrics.avg_steps() - 11.0).abs() < 1e-9);

        let mut reference = EvaluationMetrics::new();
        reference.record_episode(40, 10);
        assert!((metrics.gap_to(&reference) - 0.25).abs() < 1e-9);
    }
}
