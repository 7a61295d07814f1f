//! Policies over the scheduling environments and the decoder that turns
//! their scores into feasible actions.

pub mod dispatch;
pub mod features;

use rand::Rng;

use crate::env::{ActionMask, Environment, SchedulingState};
use crate::error::{Error, Result};

pub use dispatch::DispatchRule;
pub use features::{action_features, candidate, Candidate, Features, NUM_FEATURES};

/// Scores every action of the current state. Entries for infeasible actions
/// are ignored by the decoder.
pub trait Policy {
    fn name(&self) -> String;

    fn logits(&self, env: &dyn Environment, state: &SchedulingState) -> Vec<f32>;
}

/// How the decoder picks among feasible actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeStrategy {
    /// Highest-probability feasible action
    #[default]
    Greedy,
    /// Draw from the masked softmax distribution
    Sampling,
}

/// Log-softmax over the feasible actions; infeasible entries are `-inf`
pub fn masked_log_softmax(logits: &[f32], mask: &ActionMask) -> Vec<f32> {
    let max = logits
        .iter()
        .zip(mask.mask())
        .filter(|&(_, &ok)| ok)
        .map(|(&l, _)| l)
        .fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits
        .iter()
        .zip(mask.mask())
        .filter(|&(_, &ok)| ok)
        .map(|(&l, _)| (l - max).exp())
        .sum();
    let log_sum = max + sum.ln();

    logits
        .iter()
        .zip(mask.mask())
        .map(|(&l, &ok)| if ok { l - log_sum } else { f32::NEG_INFINITY })
        .collect()
}

/// Pick a feasible action. Returns `(action, log_prob)`.
pub fn decode<R: Rng + ?Sized>(
    logits: &[f32],
    mask: &ActionMask,
    strategy: DecodeStrategy,
    rng: &mut R,
) -> Result<(usize, f32)> {
    if logits.len() != mask.len() {
        return Err(Error::Model(format!(
            "policy produced {} logits for {} actions",
            logits.len(),
            mask.len()
        )));
    }
    if !mask.has_actions() {
        return Err(Error::InvalidTransition(
            "no feasible action to decode".to_string(),
        ));
    }

    let log_probs = masked_log_softmax(logits, mask);
    let action = match strategy {
        DecodeStrategy::Greedy => mask
            .iter_valid()
            .max_by(|&a, &b| log_probs[a].total_cmp(&log_probs[b]))
            .unwrap_or(0),
        DecodeStrategy::Sampling => {
            let u = rng.random::<f32>();
            let mut cumulative = 0.0;
            let mut chosen = None;
            for a in mask.iter_valid() {
                cumulative += log_probs[a].exp();
                chosen = Some(a);
                if u < cumulative {
                    break;
                }
            }
            // rounding can leave u above the final cumulative sum
            chosen.unwrap_or(0)
        }
    };

    Ok((action, log_probs[action]))
}

/// One decoded episode
#[derive(Debug, Clone)]
pub struct Rollout {
    pub log_probs: Vec<f32>,
    pub actions: Vec<usize>,
    /// Terminal reward, the negative makespan
    pub reward: f32,
    pub state: SchedulingState,
}

impl Rollout {
    pub fn makespan(&self) -> u32 {
        self.state.makespan()
    }

    pub fn log_likelihood(&self) -> f32 {
        self.log_probs.iter().sum()
    }
}

/// Decode `policy` on `state` until the schedule is complete
pub fn rollout<P, R>(
    policy: &P,
    env: &dyn Environment,
    mut state: SchedulingState,
    strategy: DecodeStrategy,
    rng: &mut R,
) -> Result<Rollout>
where
    P: Policy + ?Sized,
    R: Rng + ?Sized,
{
    let mut log_probs = Vec::new();
    let mut actions = Vec::new();

    while !env.is_done(&state) {
        let mask = env.action_mask(&state);
        let logits = policy.logits(env, &state);
        let (action, log_prob) = decode(&logits, &mask, strategy, rng)?;
        env.step(&mut state, action)?;
        log_probs.push(log_prob);
        actions.push(action);
    }

    Ok(Rollout {
        log_probs,
        actions,
        reward: env.reward(&state),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{JsspEnv, SchedulingInstance};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    struct Uniform;

    impl Policy for Uniform {
        fn name(&self) -> String {
            "uniform".to_string()
        }

        fn logits(&self, env: &dyn Environment, state: &SchedulingState) -> Vec<f32> {
            vec![0.0; env.num_actions(state)]
        }
    }

    #[test]
    fn test_masked_log_softmax() {
        let mask = ActionMask::new(vec![false, true, true]);
        let log_probs = masked_log_softmax(&[5.0, 1.0, 1.0], &mask);
        assert_eq!(log_probs[0], f32::NEG_INFINITY);
        assert!((log_probs[1] - 0.5f32.ln()).abs() < 1e-6);
        assert!((log_probs[2] - 0.5f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_greedy_never_picks_masked_action() {
        let mut rng = StdRng::seed_from_u64(0);
        let mask = ActionMask::new(vec![false, true, false, true]);
        let (action, log_prob) =
            decode(&[10.0, 1.0, 9.0, 2.0], &mask, DecodeStrategy::Greedy, &mut rng).unwrap();
        assert_eq!(action, 3);
        assert!(log_prob < 0.0);
    }

    #[test]
    fn test_sampling_respects_mask() {
        let mut rng = StdRng::seed_from_u64(1);
        let mask = ActionMask::new(vec![false, true, false, true, true]);
        for _ in 0..200 {
            let (action, _) =
                decode(&[0.0; 5], &mask, DecodeStrategy::Sampling, &mut rng).unwrap();
            assert!(mask.is_feasible(action));
        }
    }

    #[test]
    fn test_decode_errors() {
        let mut rng = StdRng::seed_from_u64(2);
        let empty = ActionMask::new(vec![false, false]);
        assert!(matches!(
            decode(&[0.0, 0.0], &empty, DecodeStrategy::Greedy, &mut rng),
            Err(Error::InvalidTransition(_))
        ));
        let mask = ActionMask::new(vec![true, true]);
        assert!(matches!(
            decode(&[0.0], &mask, DecodeStrategy::Greedy, &mut rng),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_rollout_completes_schedule() {
        let instance = Arc::new(
            SchedulingInstance::job_shop(2, vec![vec![(0, 3), (1, 2)], vec![(1, 4), (0, 1)]])
                .unwrap(),
        );
        let env = JsspEnv::default();
        let state = env.reset(instance).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let result = rollout(&Uniform, &env, state, DecodeStrategy::Sampling, &mut rng).unwrap();
        assert!(result.state.is_done());
        assert_eq!(result.actions.len(), 4);
        assert_eq!(result.log_probs.len(), 4);
        assert_eq!(result.reward, -(result.makespan() as f32));
        assert!(result.log_likelihood() <= 0.0);
    }
}
