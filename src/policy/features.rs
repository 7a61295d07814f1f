//! Per-action dispatch features shared by the heuristic and learned policies

use crate::env::{Environment, SchedulingState};

pub const NUM_FEATURES: usize = 3;

/// `[processing time, remaining work, remaining operation fraction]`, each
/// scaled to roughly `[0, 1]` by the instance's largest processing time and
/// longest job.
pub type Features = [f32; NUM_FEATURES];

/// Raw (unscaled) quantities of a dispatch candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub job: usize,
    pub machine: Option<usize>,
    /// Processing time of the job's next operation on the chosen machine
    pub proc_time: u32,
    pub remaining_work: u64,
    pub remaining_ops: usize,
}

/// Describe the dispatch behind `action`, `None` for the no-op
pub fn candidate(env: &dyn Environment, state: &SchedulingState, action: usize) -> Option<Candidate> {
    let job = env.action_job(state, action)?;
    let instance = state.instance();
    let op = state.next_op(job);
    let machine = env.action_machine(state, action);
    let proc_time = machine
        .map(|m| instance.proc_time(m, op))
        .filter(|&p| p > 0)
        .unwrap_or_else(|| instance.min_proc_time(op));

    Some(Candidate {
        job,
        machine,
        proc_time,
        remaining_work: state.remaining_work(job),
        remaining_ops: state.remaining_ops(job),
    })
}

/// Scaled features of `action`, `None` for the no-op
pub fn action_features(
    env: &dyn Environment,
    state: &SchedulingState,
    action: usize,
) -> Option<Features> {
    let candidate = candidate(env, state, action)?;
    let instance = state.instance();
    let max_proc = instance.max_proc_time().max(1) as f32;
    let max_len = (0..instance.num_jobs())
        .map(|j| instance.job_ops(j).len())
        .max()
        .unwrap_or(1)
        .max(1) as f32;

    Some([
        candidate.proc_time as f32 / max_proc,
        candidate.remaining_work as f32 / (max_proc * max_len),
        candidate.remaining_ops as f32 / max_len,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{JsspEnv, SchedulingInstance};
    use std::sync::Arc;

    #[test]
    fn test_features_scaled() {
        let instance = Arc::new(
            SchedulingInstance::job_shop(2, vec![vec![(0, 4), (1, 2)], vec![(1, 1)]]).unwrap(),
        );
        let env = JsspEnv::default();
        let state = env.reset(instance).unwrap();

        assert_eq!(action_features(&env, &state, 0), None);
        let f = action_features(&env, &state, 1).unwrap();
        assert!((f[0] - 1.0).abs() < 1e-6);
        assert!((f[1] - 6.0 / 8.0).abs() < 1e-6);
        assert!((f[2] - 1.0).abs() < 1e-6);

        let c = candidate(&env, &state, 2).unwrap();
        assert_eq!(c.job, 1);
        assert_eq!(c.machine, Some(1));
        assert_eq!(c.proc_time, 1);
        assert_eq!(c.remaining_ops, 1);
    }
}
