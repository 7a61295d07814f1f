//! MLP scoring dispatch candidates

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::env::{Environment, SchedulingState, NO_OP};
use crate::policy::{action_features, NUM_FEATURES};

/// Per-action input: the dispatch features plus a no-op indicator
pub const NET_INPUT_SIZE: usize = NUM_FEATURES + 1;

#[derive(Config, Debug)]
pub struct DispatchNetConfig {
    #[config(default = 32)]
    pub hidden_size: usize,
    #[config(default = 2)]
    pub num_layers: usize,
}

impl DispatchNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DispatchNet<B> {
        let input = LinearConfig::new(NET_INPUT_SIZE, self.hidden_size).init(device);

        let mut hidden = Vec::new();
        for _ in 1..self.num_layers {
            hidden.push(LinearConfig::new(self.hidden_size, self.hidden_size).init(device));
        }

        let output = LinearConfig::new(self.hidden_size, 1).init(device);

        DispatchNet {
            input,
            hidden,
            output,
            activation: Relu::new(),
        }
    }
}

/// Scores each action row independently, so one network serves every
/// instance size
#[derive(Module, Debug)]
pub struct DispatchNet<B: Backend> {
    input: Linear<B>,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> DispatchNet<B> {
    /// `[num_actions, NET_INPUT_SIZE]` rows to `[num_actions]` logits
    pub fn forward(&self, rows: Tensor<B, 2>) -> Tensor<B, 1> {
        let [num_actions, _] = rows.dims();
        let mut x = self.activation.forward(self.input.forward(rows));

        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }

        self.output.forward(x).reshape([num_actions])
    }
}

/// Flattened input rows for every action of `state`
pub fn action_rows(env: &dyn Environment, state: &SchedulingState) -> (Vec<f32>, usize) {
    let num_actions = env.num_actions(state);
    let mut rows = Vec::with_capacity(num_actions * NET_INPUT_SIZE);
    for action in 0..num_actions {
        match action_features(env, state, action) {
            Some(features) => {
                rows.extend_from_slice(&features);
                rows.push(0.0);
            }
            None => {
                rows.extend_from_slice(&[0.0; NUM_FEATURES]);
                rows.push(if action == NO_OP { 1.0 } else { 0.0 });
            }
        }
    }
    (rows, num_actions)
}

/// Network logits for every action of `state`
pub fn action_logits<B: Backend>(
    net: &DispatchNet<B>,
    env: &dyn Environment,
    state: &SchedulingState,
    device: &B::Device,
) -> Tensor<B, 1> {
    let (rows, num_actions) = action_rows(env, state);
    let data = TensorData::new(rows, [num_actions, NET_INPUT_SIZE]);
    net.forward(Tensor::from_data(data, device))
}
