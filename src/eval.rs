//! Policy evaluation on fixed instance sets

use std::sync::Arc;

use rand::Rng;

use crate::env::{Environment, SchedulingInstance};
use crate::error::Result;
use crate::metrics::EvaluationMetrics;
use crate::policy::{rollout, DecodeStrategy, Policy};

/// Roll `policy` out once on every instance
pub fn evaluate<P, R>(
    policy: &P,
    env: &dyn Environment,
    instances: &[Arc<SchedulingInstance>],
    strategy: DecodeStrategy,
    rng: &mut R,
) -> Result<EvaluationMetrics>
where
    P: Policy + ?Sized,
    R: Rng + ?Sized,
{
    let mut metrics = EvaluationMetrics::new();
    for instance in instances {
        let state = env.reset(Arc::clone(instance))?;
        let result = rollout(policy, env, state, strategy, rng)?;
        metrics.record_episode(result.makespan(), result.actions.len());
    }
    Ok(metrics)
}

/// Evaluate several policies on the same instances. The first policy is the
/// reference for the logged gaps.
pub fn compare<R: Rng + ?Sized>(
    policies: &[&dyn Policy],
    env: &dyn Environment,
    instances: &[Arc<SchedulingInstance>],
    strategy: DecodeStrategy,
    rng: &mut R,
) -> Result<Vec<(String, EvaluationMetrics)>> {
    let results = policies
        .iter()
        .map(|policy| Ok((policy.name(), evaluate(*policy, env, instances, strategy, rng)?)))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        "Evaluation on {} {} instances ({:?} decoding):",
        instances.len(),
        env.name(),
        strategy
    );
    if let Some((_, reference)) = results.first() {
        for (name, metrics) in &results {
            metrics.print_summary(name);
            tracing::info!("{:>8}  gap={:+.2}%", "", 100.0 * metrics.gap_to(reference));
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Generator, JsspEnv, JsspGenerator};
    use crate::policy::DispatchRule;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_evaluate_counts_episodes() {
        let mut rng = StdRng::seed_from_u64(5);
        let instances = JsspGenerator::new(5, 3, 1, 20)
            .unwrap()
            .generate_batch(6, &mut rng)
            .unwrap();
        let env = JsspEnv::default();

        let metrics =
            evaluate(&DispatchRule::Spt, &env, &instances, DecodeStrategy::Greedy, &mut rng)
                .unwrap();
        assert_eq!(metrics.num_episodes, 6);
        // masked no-ops: one decision per operation
        assert!((metrics.avg_steps() - 15.0).abs() < 1e-9);
        assert!(metrics.min_makespan.unwrap() <= metrics.max_makespan.unwrap());
        for instance in &instances {
            // makespan is at least the longest job
            let longest: u64 = (0..instance.num_jobs())
                .map(|j| instance.job_ops(j).map(|op| instance.min_proc_time(op) as u64).sum())
                .max()
                .unwrap();
            assert!(metrics.max_makespan.unwrap() as u64 >= longest);
        }
    }

    #[test]
    fn test_compare_keeps_order() {
        let mut rng = StdRng::seed_from_u64(6);
        let instances = JsspGenerator::new(4, 2, 1, 9)
            .unwrap()
            .generate_batch(3, &mut rng)
            .unwrap();
        let env = JsspEnv::default();
        let policies: Vec<&dyn Policy> =
            vec![&DispatchRule::Lpt, &DispatchRule::Spt, &DispatchRule::Mwkr];

        let results =
            compare(&policies, &env, &instances, DecodeStrategy::Greedy, &mut rng).unwrap();
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["LPT", "SPT", "MWKR"]);
        assert!(results.iter().all(|(_, m)| m.num_episodes == 3));
    }

    #[test]
    fn test_greedy_evaluation_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let instances = JsspGenerator::new(4, 3, 1, 9)
            .unwrap()
            .generate_batch(4, &mut rng)
            .unwrap();
        let env = JsspEnv::default();

        let a = evaluate(&DispatchRule::Mor, &env, &instances, DecodeStrategy::Greedy, &mut rng)
            .unwrap();
        let b = evaluate(&DispatchRule::Mor, &env, &instances, DecodeStrategy::Greedy, &mut rng)
            .unwrap();
        assert_eq!(a.total_makespan, b.total_makespan);
    }
}
