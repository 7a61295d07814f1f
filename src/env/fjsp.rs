//! Flexible job-shop environment: the agent picks a (job, machine) pair

use std::sync::Arc;

use crate::error::{Error, Result};

use super::engine::{Engine, SchedulingState};
use super::instance::SchedulingInstance;
use super::mask::{ActionMask, NO_OP};
use super::Environment;

/// Flexible job-shop scheduling environment.
///
/// Action `1 + job * num_machines + machine` starts the job's next operation
/// on that machine; action 0 waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FjspEnv {
    engine: Engine,
}

impl FjspEnv {
    pub fn new(mask_no_ops: bool) -> Self {
        Self {
            engine: Engine::new(mask_no_ops),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Action index for dispatching `job` on `machine`
    pub fn dispatch_action(state: &SchedulingState, job: usize, machine: usize) -> usize {
        1 + job * state.num_machines() + machine
    }

    /// Inverse of [`FjspEnv::dispatch_action`]
    pub fn decode_action(state: &SchedulingState, action: usize) -> Option<(usize, usize)> {
        if action == NO_OP {
            return None;
        }
        let flat = action - 1;
        let job = flat / state.num_machines();
        (job < state.num_jobs()).then_some((job, flat % state.num_machines()))
    }
}

impl Environment for FjspEnv {
    fn name(&self) -> &'static str {
        "fjsp"
    }

    fn num_actions(&self, state: &SchedulingState) -> usize {
        1 + state.num_jobs() * state.num_machines()
    }

    fn reset(&self, instance: Arc<SchedulingInstance>) -> Result<SchedulingState> {
        self.engine.reset(instance)
    }

    fn action_mask(&self, state: &SchedulingState) -> ActionMask {
        let mut mask = Vec::with_capacity(self.num_actions(state));
        mask.push(self.engine.no_op_feasible(state));
        for row in self.engine.availability(state) {
            mask.extend(row);
        }
        ActionMask::new(mask)
    }

    fn step(&self, state: &mut SchedulingState, action: usize) -> Result<()> {
        if state.is_done() {
            return Err(Error::InvalidTransition(
                "step called on a finished schedule".to_string(),
            ));
        }

        match Self::decode_action(state, action) {
            None if action == NO_OP => {
                if !self.engine.no_op_feasible(state) {
                    return Err(Error::InvalidAction {
                        action,
                        reason: "waiting is masked while work can be dispatched".to_string(),
                    });
                }
                self.engine.wait(state)?;
            }
            None => {
                return Err(Error::InvalidAction {
                    action,
                    reason: format!("out of range for {} actions", self.num_actions(state)),
                });
            }
            Some((job, machine)) => {
                if !self.engine.can_dispatch(state, job, machine) {
                    return Err(Error::InvalidAction {
                        action,
                        reason: format!("job {job} cannot start on machine {machine}"),
                    });
                }
                self.engine.dispatch(state, job, machine)?;
            }
        }

        self.engine.count_step(state);
        self.engine.settle(state)
    }

    fn action_job(&self, state: &SchedulingState, action: usize) -> Option<usize> {
        Self::decode_action(state, action).map(|(job, _)| job)
    }

    fn action_machine(&self, state: &SchedulingState, action: usize) -> Option<usize> {
        Self::decode_action(state, action).map(|(_, machine)| machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Job 0: one op on m0 (5) or m1 (2). Job 1: one op on m1 (3).
    fn instance() -> Arc<SchedulingInstance> {
        Arc::new(
            SchedulingInstance::new(2, vec![vec![vec![(0, 5), (1, 2)]], vec![vec![(1, 3)]]])
                .unwrap(),
        )
    }

    #[test]
    fn test_mask_layout() {
        let env = FjspEnv::default();
        let state = env.reset(instance()).unwrap();
        // [noop, (j0,m0), (j0,m1), (j1,m0), (j1,m1)]
        assert_eq!(
            env.action_mask(&state).mask(),
            &[false, true, true, false, true]
        );
    }

    #[test]
    fn test_action_round_trip() {
        let env = FjspEnv::default();
        let state = env.reset(instance()).unwrap();
        let action = FjspEnv::dispatch_action(&state, 1, 1);
        assert_eq!(action, 4);
        assert_eq!(FjspEnv::decode_action(&state, action), Some((1, 1)));
        assert_eq!(FjspEnv::decode_action(&state, 5), None);
        assert_eq!(env.action_machine(&state, 2), Some(1));
    }

    #[test]
    fn test_machine_choice_changes_makespan() {
        let env = FjspEnv::default();

        // job 0 on the slow machine, job 1 on m1 in parallel
        let mut state = env.reset(instance()).unwrap();
        env.step(&mut state, 1).unwrap();
        env.step(&mut state, 4).unwrap();
        assert!(env.is_done(&state));
        assert_eq!(env.reward(&state), -5.0);

        // both on m1, sequentially
        let mut state = env.reset(instance()).unwrap();
        env.step(&mut state, 2).unwrap();
        // m1 was busy, so the engine moved on to t=2 before handing back control
        assert_eq!(state.time(), 2);
        assert!(env.action_mask(&state).is_feasible(4));
        env.step(&mut state, 4).unwrap();
        assert!(env.is_done(&state));
        assert_eq!(env.reward(&state), -5.0);
        assert_eq!(state.start_time(1), Some(2));
    }

    #[test]
    fn test_ineligible_machine_rejected() {
        let env = FjspEnv::default();
        let mut state = env.reset(instance()).unwrap();
        assert!(matches!(
            env.step(&mut state, 3),
            Err(Error::InvalidAction { .. })
        ));
        assert!(matches!(
            env.step(&mut state, 42),
            Err(Error::InvalidAction { .. })
        ));
    }
}
