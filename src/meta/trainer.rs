//! Host training loop driving the Reptile step functions

use crate::env::Generator;
use crate::error::Result;
use crate::metrics::TrainingMetrics;
use crate::report::{ReportRow, RunReport};

use super::params::MetaModel;
use super::reptile::{
    on_epoch_end, on_epoch_start, on_fit_start, EpochEnd, EpochStart, MetaTrainerState,
    ReptileConfig,
};

/// Summary of one inner-loop epoch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub mean_reward: f32,
    pub mean_makespan: f32,
    pub loss: f32,
    pub episodes: usize,
}

/// Inner loop: fine-tunes the live model on instances from `generator`
pub trait EpochTrainer<G: Generator> {
    fn train_epoch(&mut self, generator: &G, epoch: usize) -> Result<EpochStats>;
}

/// Record of one finished epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub start: EpochStart,
    pub stats: EpochStats,
    pub end: EpochEnd,
}

/// Meta-trainer owning the model, the generator and the outer-loop state
pub struct MetaTrainer<M, G> {
    model: M,
    generator: G,
    config: ReptileConfig,
    state: Option<MetaTrainerState>,
    metrics: TrainingMetrics,
    report: Option<RunReport>,
    log_interval: usize,
}

impl<M, G> MetaTrainer<M, G>
where
    M: MetaModel + EpochTrainer<G>,
    G: Generator,
{
    /// Fails on an unsupported outer-loop configuration before training
    pub fn new(model: M, generator: G, config: ReptileConfig) -> Result<Self> {
        MetaTrainerState::new(config.clone())?;
        Ok(Self {
            model,
            generator,
            config,
            state: None,
            metrics: TrainingMetrics::default(),
            report: None,
            log_interval: 1,
        })
    }

    pub fn with_report(mut self, report: RunReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Log aggregated metrics every `interval` epochs
    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    /// Run `max_epochs` epochs of meta-training
    pub fn fit(&mut self, max_epochs: usize) -> Result<Vec<EpochRecord>> {
        let mut state = on_fit_start(MetaTrainerState::new(self.config.clone())?, &self.generator);
        let mut records = Vec::with_capacity(max_epochs);

        for epoch in 0..max_epochs {
            let (next, start) =
                on_epoch_start(state, epoch, max_epochs, &mut self.model, &mut self.generator)?;

            let stats = self.model.train_epoch(&self.generator, epoch)?;

            let (next, end) = on_epoch_end(next, epoch, &mut self.model, &mut self.generator)?;
            state = next;

            self.metrics.record_epoch(
                epoch,
                start.task.size,
                stats.mean_reward,
                stats.mean_makespan,
                stats.loss,
                stats.episodes,
            );
            if end.aggregated {
                self.metrics.record_meta_update();
            }
            if let Some(report) = &mut self.report {
                report.append(&ReportRow::new(&start, &stats, &end))?;
            }
            if (epoch + 1) % self.log_interval == 0 {
                self.metrics.log_to_console();
            }

            records.push(EpochRecord { start, stats, end });
        }

        self.state = Some(state);
        Ok(records)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Outer-loop state after the last `fit`
    pub fn state(&self) -> Option<&MetaTrainerState> {
        self.state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::JsspGenerator;
    use crate::error::Error;
    use crate::meta::params::{ParamTensor, ParameterSnapshot, ParameterStore};

    /// Model whose inner loop moves its weight toward the task size
    struct SizeSeeker {
        weight: f32,
        lr: f64,
    }

    impl ParameterStore for SizeSeeker {
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

    impl MetaModel for SizeSeeker {
        fn learning_rate(&self) -> f64 {
            self.lr
        }

        fn rebuild_optimizer(&mut self, learning_rate: f64) {
            self.lr = learning_rate;
        }
    }

    impl EpochTrainer<JsspGenerator> for SizeSeeker {
        fn train_epoch(&mut self, generator: &JsspGenerator, _epoch: usize) -> Result<EpochStats> {
            let target = generator.num_jobs as f32;
            self.weight += 0.5 * (target - self.weight);
            Ok(EpochStats {
                mean_reward: -target,
                mean_makespan: target,
                loss: (target - self.weight).abs(),
                episodes: 1,
            })
        }
    }

    #[test]
    fn test_fit_moves_meta_model_toward_tasks() {
        let model = SizeSeeker { weight: 0.0, lr: 0.1 };
        let config = ReptileConfig {
            num_tasks: 2,
            min_size: 8,
            max_size: 8,
            alpha: 1.0,
            alpha_decay: 1.0,
            ..ReptileConfig::default()
        };
        let generator = JsspGenerator {
            num_jobs: 8,
            ..JsspGenerator::default()
        };
        let mut trainer = MetaTrainer::new(model, generator, config).unwrap();

        let records = trainer.fit(4).unwrap();
        assert_eq!(records.len(), 4);
        let aggregated: Vec<usize> = records
            .iter()
            .filter(|r| r.end.aggregated)
            .map(|r| r.end.epoch)
            .collect();
        assert_eq!(aggregated, vec![1, 3]);

        // each meta-epoch halves the distance to 8
        assert!((trainer.model().weight - 6.0).abs() < 1e-5);
        assert_eq!(trainer.metrics().meta_updates, 2);
        assert_eq!(trainer.metrics().total_episodes, 4);
        assert!(trainer.state().is_some());
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let model = SizeSeeker { weight: 0.0, lr: 0.1 };
        let config = ReptileConfig {
            data_type: "capacity".to_string(),
            ..ReptileConfig::default()
        };
        assert!(MetaTrainer::new(model, JsspGenerator::default(), config).is_err());
    }
}
