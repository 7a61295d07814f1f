//! Scheduling environments - gym-like state machines the policy rolls out against
//!
//! ```text
//! SchedulingInstance (static adjacency, processing times)
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Engine                                                     │
//! │  - dispatch (job, machine) at the current time              │
//! │  - advance time to the next machine release                 │
//! │  - feasibility: job idle ∧ machine idle ∧ machine eligible  │
//! └─────────────────────────────────────────────────────────────┘
//!     │                              │
//!     ▼                              ▼
//!  JsspEnv (action = job)        FjspEnv (action = job × machine)
//! ```

pub mod engine;
pub mod fjsp;
pub mod generator;
pub mod instance;
pub mod jssp;
pub mod mask;

use std::sync::Arc;

use crate::error::Result;

pub use engine::{Engine, SchedulingState};
pub use fjsp::FjspEnv;
pub use generator::{
    FjspGenerator, Generator, JsspGenerator, RoutingGenerator, RoutingInstance,
};
pub use instance::{OperationSpec, SchedulingInstance};
pub use jssp::JsspEnv;
pub use mask::{ActionMask, NO_OP};

/// Shared state-machine contract of the scheduling environments.
///
/// States are RUNNING until every operation has finished, then DONE. A
/// RUNNING state always offers at least one feasible action; DONE accepts no
/// further steps.
pub trait Environment {
    fn name(&self) -> &'static str;

    /// Size of the discrete action space (action 0 is the no-op)
    fn num_actions(&self, state: &SchedulingState) -> usize;

    fn reset(&self, instance: Arc<SchedulingInstance>) -> Result<SchedulingState>;

    /// Apply a feasible action. Infeasible actions fail with `InvalidAction`,
    /// finished states with `InvalidTransition`; the state is left untouched
    /// on error.
    fn step(&self, state: &mut SchedulingState, action: usize) -> Result<()>;

    fn action_mask(&self, state: &SchedulingState) -> ActionMask;

    fn is_done(&self, state: &SchedulingState) -> bool {
        state.is_done()
    }

    /// Sparse reward: 0 until done, then the negative makespan
    fn reward(&self, state: &SchedulingState) -> f32 {
        if state.is_done() {
            -(state.makespan() as f32)
        } else {
            0.0
        }
    }

    /// Job dispatched by `action`, `None` for the no-op
    fn action_job(&self, state: &SchedulingState, action: usize) -> Option<usize>;

    /// Machine chosen by `action` when the action names one explicitly
    fn action_machine(&self, state: &SchedulingState, action: usize) -> Option<usize> {
        let job = self.action_job(state, action)?;
        state
            .instance()
            .eligible_machines(state.next_op(job))
            .find(|&m| state.is_machine_idle(m))
    }
}

/// Batch of episodes stepped in lockstep
pub struct BatchEnv<E: Environment> {
    env: E,
    states: Vec<SchedulingState>,
}

impl<E: Environment> BatchEnv<E> {
    pub fn new(env: E, instances: Vec<Arc<SchedulingInstance>>) -> Result<Self> {
        let states = instances
            .into_iter()
            .map(|instance| env.reset(instance))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { env, states })
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn states(&self) -> &[SchedulingState] {
        &self.states
    }

    /// Reset every episode to its initial state
    pub fn reset_all(&mut self) -> Result<()> {
        for state in &mut self.states {
            *state = self.env.reset(state.shared_instance())?;
        }
        Ok(())
    }

    pub fn masks(&self) -> Vec<ActionMask> {
        self.states.iter().map(|s| self.env.action_mask(s)).collect()
    }

    /// Step all unfinished episodes; actions for finished ones are ignored
    pub fn step_all(&mut self, actions: &[usize]) -> Result<()> {
        for (state, &action) in self.states.iter_mut().zip(actions.iter()) {
            if !state.is_done() {
                self.env.step(state, action)?;
            }
        }
        Ok(())
    }

    pub fn all_done(&self) -> bool {
        self.states.iter().all(|s| s.is_done())
    }

    pub fn rewards(&self) -> Vec<f32> {
        self.states.iter().map(|s| self.env.reward(s)).collect()
    }

    /// Get batch size
    pub fn batch_size(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances() -> Vec<Arc<SchedulingInstance>> {
        vec![
            Arc::new(SchedulingInstance::job_shop(1, vec![vec![(0, 2)], vec![(0, 3)]]).unwrap()),
            Arc::new(SchedulingInstance::job_shop(1, vec![vec![(0, 4)]]).unwrap()),
        ]
    }

    #[test]
    fn test_batch_env_lockstep() {
        let mut batch = BatchEnv::new(JsspEnv::default(), instances()).unwrap();
        assert_eq!(batch.batch_size(), 2);

        batch.step_all(&[1, 1]).unwrap();
        // second instance had a single job and is finished
        assert!(!batch.states()[0].is_done());
        assert!(batch.states()[1].is_done());
        assert_eq!(batch.rewards(), vec![0.0, -4.0]);

        batch.step_all(&[2, 1]).unwrap();
        assert!(batch.all_done());
        assert_eq!(batch.rewards(), vec![-5.0, -4.0]);

        batch.reset_all().unwrap();
        assert!(!batch.all_done());
        assert!(batch.masks().iter().all(|m| m.has_actions()));
    }

    #[test]
    fn test_default_action_machine() {
        let env = JsspEnv::default();
        let state = env.reset(instances().remove(0)).unwrap();
        assert_eq!(env.action_machine(&state, 1), Some(0));
        assert_eq!(env.action_machine(&state, NO_OP), None);
    }
}
