use std::sync::Arc;

use burn::backend::{Autodiff, NdArray};
use burn::optim::AdamConfig;
use dotenv::dotenv;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use metaco::env::{Environment, FjspGenerator, Generator, JsspGenerator, SchedulingInstance};
use metaco::eval::compare;
use metaco::meta::{EpochTrainer, MetaModel, MetaTrainer};
use metaco::neural::{BurnLearner, DispatchNet, DispatchNetConfig};
use metaco::policy::{DecodeStrategy, DispatchRule, Policy};
use metaco::report::RunReport;
use metaco::{FjspEnv, JsspEnv, Problem, TrainConfig};

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metaco=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Meta-train `model`, then compare it with the dispatch rules on held-out
/// instances of the originally configured size
fn run<M, E, G>(config: &TrainConfig, model: M, env: E, generator: G) -> metaco::Result<()>
where
    M: MetaModel + EpochTrainer<G> + Policy,
    E: Environment,
    G: Generator<Instance = Arc<SchedulingInstance>> + Clone,
{
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(2));
    let eval_instances = generator.generate_batch(config.eval_instances, &mut rng)?;

    let mut trainer = MetaTrainer::new(model, generator, config.reptile())?;
    if let Some(folder) = &config.reports_folder {
        trainer = trainer.with_report(RunReport::new(folder)?);
    }

    trainer.fit(config.max_epochs)?;

    let model = trainer.into_model();
    let mut policies: Vec<&dyn Policy> = vec![&model];
    for rule in &DispatchRule::ALL {
        policies.push(rule);
    }
    compare(&policies, &env, &eval_instances, DecodeStrategy::Greedy, &mut rng)?;
    Ok(())
}

/// Build the dispatch network learner and meta-train it
fn train<E, G>(config: &TrainConfig, env: E, generator: G) -> metaco::Result<()>
where
    E: Environment + Clone,
    G: Generator<Instance = Arc<SchedulingInstance>> + Clone,
{
    type TrainBackend = Autodiff<NdArray>;

    let device = Default::default();
    let model = DispatchNetConfig::new().init::<TrainBackend>(&device);
    let learner = BurnLearner::new(
        env.clone(),
        model,
        || AdamConfig::new().init::<TrainBackend, DispatchNet<TrainBackend>>(),
        config.reinforce(),
        device,
    );
    run(config, learner, env, generator)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = TrainConfig::from_env()?;
    tracing::info!(
        "Meta-training {:?} for {} epochs: {} tasks per meta-epoch, sizes {}..={}",
        config.problem,
        config.max_epochs,
        config.num_tasks,
        config.min_size,
        config.max_size
    );

    match config.problem {
        Problem::Jssp => {
            let generator = JsspGenerator::new(
                config.num_jobs,
                config.num_machines,
                config.min_proc_time,
                config.max_proc_time,
            )?;
            train(&config, JsspEnv::new(config.mask_no_ops), generator)?;
        }
        Problem::Fjsp => {
            let generator = FjspGenerator::new(
                config.num_jobs,
                config.num_machines,
                config.min_proc_time,
                config.max_proc_time,
            )?;
            train(&config, FjspEnv::new(config.mask_no_ops), generator)?;
        }
    }

    Ok(())
}
