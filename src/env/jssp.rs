//! Job-shop environment: the agent picks a job, the engine runs its next
//! operation on the eligible machine.

use std::sync::Arc;

use crate::error::{Error, Result};

use super::engine::{Engine, SchedulingState};
use super::instance::SchedulingInstance;
use super::mask::{ActionMask, NO_OP};
use super::Environment;

/// Job-shop scheduling environment.
///
/// Action 0 waits for the next machine to become idle, action `1 + j`
/// dispatches job `j`. The reward is 0 until every operation is finished and
/// then the negative makespan.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsspEnv {
    engine: Engine,
}

impl JsspEnv {
    pub fn new(mask_no_ops: bool) -> Self {
        Self {
            engine: Engine::new(mask_no_ops),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Action index that dispatches `job`
    pub fn job_action(job: usize) -> usize {
        job + 1
    }
}

impl Environment for JsspEnv {
    fn name(&self) -> &'static str {
        "jssp"
    }

    fn num_actions(&self, state: &SchedulingState) -> usize {
        1 + state.num_jobs()
    }

    fn reset(&self, instance: Arc<SchedulingInstance>) -> Result<SchedulingState> {
        self.engine.reset(instance)
    }

    fn action_mask(&self, state: &SchedulingState) -> ActionMask {
        let mut mask = Vec::with_capacity(self.num_actions(state));
        mask.push(self.engine.no_op_feasible(state));
        mask.extend((0..state.num_jobs()).map(|job| self.engine.job_feasible(state, job)));
        ActionMask::new(mask)
    }

    fn step(&self, state: &mut SchedulingState, action: usize) -> Result<()> {
        if state.is_done() {
            return Err(Error::InvalidTransition(
                "step called on a finished schedule".to_string(),
            ));
        }
        if action >= self.num_actions(state) {
            return Err(Error::InvalidAction {
                action,
                reason: format!("out of range for {} actions", self.num_actions(state)),
            });
        }

        if action == NO_OP {
            if !self.engine.no_op_feasible(state) {
                return Err(Error::InvalidAction {
                    action,
                    reason: "waiting is masked while work can be dispatched".to_string(),
                });
            }
            self.engine.wait(state)?;
        } else {
            let job = action - 1;
            let machine = self.engine.first_available_machine(state, job).ok_or_else(|| {
                Error::InvalidAction {
                    action,
                    reason: format!("job {job} is done, in process or has no idle machine"),
                }
            })?;
            self.engine.dispatch(state, job, machine)?;
        }

        self.engine.count_step(state);
        self.engine.settle(state)
    }

    fn action_job(&self, state: &SchedulingState, action: usize) -> Option<usize> {
        (action != NO_OP && action <= state.num_jobs()).then(|| action - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Arc<SchedulingInstance> {
        Arc::new(
            SchedulingInstance::job_shop(2, vec![vec![(0, 3), (1, 2)], vec![(1, 4), (0, 1)]])
                .unwrap(),
        )
    }

    #[test]
    fn test_initial_mask() {
        let env = JsspEnv::default();
        let state = env.reset(instance()).unwrap();
        assert_eq!(env.action_mask(&state).mask(), &[false, true, true]);
    }

    #[test]
    fn test_full_episode_makespan() {
        let env = JsspEnv::default();
        let mut state = env.reset(instance()).unwrap();

        // t=0: job 0 on m0 (0..3), job 1 on m1 (0..4)
        env.step(&mut state, 1).unwrap();
        assert_eq!(env.reward(&state), 0.0);
        env.step(&mut state, 2).unwrap();

        // nothing is dispatchable until m1 frees up at t=4
        assert_eq!(state.time(), 4);
        assert_eq!(env.action_mask(&state).mask(), &[false, true, true]);
        assert_eq!(env.reward(&state), 0.0);

        env.step(&mut state, 1).unwrap();
        env.step(&mut state, 2).unwrap();

        assert!(env.is_done(&state));
        assert_eq!(state.steps(), 4);
        assert_eq!(state.makespan(), 6);
        assert_eq!(env.reward(&state), -6.0);
        assert_eq!(env.action_mask(&state).mask(), &[true, false, false]);
    }

    #[test]
    fn test_masked_no_op_rejected() {
        let env = JsspEnv::default();
        let mut state = env.reset(instance()).unwrap();
        let before = state.clone();
        assert!(matches!(
            env.step(&mut state, NO_OP),
            Err(Error::InvalidAction { .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_in_process_job_rejected() {
        let env = JsspEnv::default();
        let mut state = env.reset(instance()).unwrap();
        env.step(&mut state, 1).unwrap();
        assert!(!env.action_mask(&state).is_feasible(1));
        assert!(matches!(
            env.step(&mut state, 1),
            Err(Error::InvalidAction { .. })
        ));
        assert!(matches!(
            env.step(&mut state, 9),
            Err(Error::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_step_after_done_is_invalid_transition() {
        let env = JsspEnv::default();
        let mut state = env.reset(instance()).unwrap();
        for action in [1, 2, 1, 2] {
            env.step(&mut state, action).unwrap();
        }
        assert!(matches!(
            env.step(&mut state, NO_OP),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_unmasked_no_op_waits() {
        let env = JsspEnv::new(false);
        let mut state = env.reset(instance()).unwrap();
        env.step(&mut state, 1).unwrap();
        assert!(env.action_mask(&state).is_feasible(NO_OP));

        env.step(&mut state, NO_OP).unwrap();
        assert_eq!(state.time(), 3);
        // job 0 finished its first op, its next op needs the idle m1
        assert!(env.action_mask(&state).is_feasible(1));
        assert!(env.action_mask(&state).is_feasible(2));
    }

    #[test]
    fn test_action_job_translation() {
        let env = JsspEnv::default();
        let state = env.reset(instance()).unwrap();
        assert_eq!(env.action_job(&state, NO_OP), None);
        assert_eq!(env.action_job(&state, 2), Some(1));
        assert_eq!(env.action_job(&state, 3), None);
        assert_eq!(JsspEnv::job_action(1), 2);
    }
}
