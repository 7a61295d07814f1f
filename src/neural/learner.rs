//! REINFORCE over the dispatch network with burn autodiff

use std::sync::Arc;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::env::{Environment, Generator, SchedulingInstance, SchedulingState};
use crate::error::Result;
use crate::meta::{EpochStats, EpochTrainer, MetaModel, ParameterSnapshot, ParameterStore};
use crate::policy::{decode, DecodeStrategy, Policy};

use super::net::{action_logits, DispatchNet};
use super::params::{load_module, snapshot_module};

/// Added to infeasible logits before the softmax
const MASK_PENALTY: f32 = 1.0e9;

#[derive(Debug, Clone, PartialEq)]
pub struct ReinforceConfig {
    /// Episodes per gradient step
    pub batch_size: usize,
    /// Gradient steps per epoch
    pub steps_per_epoch: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ReinforceConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            steps_per_epoch: 8,
            learning_rate: 1e-2,
            seed: 1234,
        }
    }
}

/// Policy-gradient learner over a [`DispatchNet`]. The optimizer is built by
/// `make_optimizer` so the meta loop can replace it every epoch.
pub struct BurnLearner<B: AutodiffBackend, E, O> {
    env: E,
    model: DispatchNet<B>,
    optimizer: O,
    make_optimizer: fn() -> O,
    learning_rate: f64,
    config: ReinforceConfig,
    device: B::Device,
    rng: StdRng,
}

impl<B, E, O> BurnLearner<B, E, O>
where
    B: AutodiffBackend,
    E: Environment,
    O: Optimizer<DispatchNet<B>, B>,
{
    pub fn new(
        env: E,
        model: DispatchNet<B>,
        make_optimizer: fn() -> O,
        config: ReinforceConfig,
        device: B::Device,
    ) -> Self {
        Self {
            env,
            model,
            optimizer: make_optimizer(),
            make_optimizer,
            learning_rate: config.learning_rate,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
        }
    }

    pub fn model(&self) -> &DispatchNet<B> {
        &self.model
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Sample one episode; returns the summed log-probability tensor and the
    /// terminal state
    fn sample_episode(
        &mut self,
        instance: Arc<SchedulingInstance>,
    ) -> Result<(Tensor<B, 1>, SchedulingState)> {
        let mut state = self.env.reset(instance)?;
        let mut log_probs = Vec::new();

        while !self.env.is_done(&state) {
            let mask = self.env.action_mask(&state);
            let logits = action_logits(&self.model, &self.env, &state, &self.device);

            let host_logits: Vec<f32> = logits.to_data().iter::<f32>().collect();
            let (action, _) = decode(&host_logits, &mask, DecodeStrategy::Sampling, &mut self.rng)?;

            let penalty = Tensor::<B, 1>::from_data(
                TensorData::new(mask.as_floats(), [mask.len()]),
                &self.device,
            )
            .sub_scalar(1.0)
            .mul_scalar(MASK_PENALTY);
            let step_log_probs = log_softmax(logits + penalty, 0);
            log_probs.push(step_log_probs.slice([action..action + 1]));

            self.env.step(&mut state, action)?;
        }

        let total = if log_probs.is_empty() {
            Tensor::zeros([1], &self.device)
        } else {
            Tensor::cat(log_probs, 0).sum()
        };
        Ok((total, state))
    }
}

impl<B, E, O> ParameterStore for BurnLearner<B, E, O>
where
    B: AutodiffBackend,
    E: Environment,
    O: Optimizer<DispatchNet<B>, B>,
{
    fn parameters(&self) -> ParameterSnapshot {
        snapshot_module(&self.model)
    }

    fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.model = load_module(self.model.clone(), snapshot)?;
        Ok(())
    }
}

impl<B, E, O> MetaModel for BurnLearner<B, E, O>
where
    B: AutodiffBackend,
    E: Environment,
    O: Optimizer<DispatchNet<B>, B>,
{
    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn rebuild_optimizer(&mut self, learning_rate: f64) {
        self.optimizer = (self.make_optimizer)();
        self.learning_rate = learning_rate;
    }
}

impl<B, E, O, G> EpochTrainer<G> for BurnLearner<B, E, O>
where
    B: AutodiffBackend,
    E: Environment,
    O: Optimizer<DispatchNet<B>, B>,
    G: Generator<Instance = Arc<SchedulingInstance>>,
{
    fn train_epoch(&mut self, generator: &G, epoch: usize) -> Result<EpochStats> {
        let mut reward_sum = 0.0;
        let mut makespan_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut episodes = 0;

        for _ in 0..self.config.steps_per_epoch {
            let instances = generator.generate_batch(self.config.batch_size, &mut self.rng)?;
            if instances.is_empty() {
                continue;
            }

            let mut log_likelihoods = Vec::with_capacity(instances.len());
            let mut rewards = Vec::with_capacity(instances.len());
            for instance in instances {
                let (log_likelihood, state) = self.sample_episode(instance)?;
                rewards.push(self.env.reward(&state));
                makespan_sum += state.makespan() as f32;
                log_likelihoods.push(log_likelihood);
            }

            let n = rewards.len() as f32;
            let baseline = rewards.iter().sum::<f32>() / n;
            let scale = baseline.abs().max(1.0);
            let advantages: Vec<f32> = rewards.iter().map(|r| (r - baseline) / scale).collect();

            let advantages = Tensor::<B, 1>::from_data(
                TensorData::new(advantages, [rewards.len()]),
                &self.device,
            );
            let loss = -(Tensor::cat(log_likelihoods, 0) * advantages).mean();

            loss_sum += loss.to_data().iter::<f32>().next().unwrap_or(0.0);
            reward_sum += rewards.iter().sum::<f32>();
            episodes += rewards.len();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.learning_rate, self.model.clone(), grads);
        }

        let count = episodes.max(1) as f32;
        let stats = EpochStats {
            mean_reward: reward_sum / count,
            mean_makespan: makespan_sum / count,
            loss: loss_sum / self.config.steps_per_epoch.max(1) as f32,
            episodes,
        };
        tracing::debug!(
            "Epoch {} on {}: reward={:.2} makespan={:.1} loss={:.4}",
            epoch,
            generator.task(),
            stats.mean_reward,
            stats.mean_makespan,
            stats.loss
        );
        Ok(stats)
    }
}

impl<B, E, O> Policy for BurnLearner<B, E, O>
where
    B: AutodiffBackend,
    E: Environment,
    O: Optimizer<DispatchNet<B>, B>,
{
    fn name(&self) -> String {
        "dispatch-net".to_string()
    }

    fn logits(&self, env: &dyn Environment, state: &SchedulingState) -> Vec<f32> {
        action_logits(&self.model, env, state, &self.device)
            .to_data()
            .iter::<f32>()
            .collect()
    }
}
