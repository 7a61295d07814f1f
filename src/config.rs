//! Run configuration from `METACO_*` environment variables

use std::env;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::meta::ReptileConfig;
use crate::neural::ReinforceConfig;

/// Scheduling problem to train on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Jssp,
    Fjsp,
}

impl FromStr for Problem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jssp" => Ok(Problem::Jssp),
            "fjsp" => Ok(Problem::Fjsp),
            other => Err(Error::config(
                "METACO_PROBLEM",
                format!("unknown problem '{other}', expected jssp or fjsp"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub max_epochs: usize,
    pub seed: u64,
    pub reports_folder: Option<String>,

    pub num_tasks: usize,
    pub alpha: f32,
    pub alpha_decay: f32,
    pub min_size: usize,
    pub max_size: usize,
    pub sch_bar: f64,
    pub data_type: String,

    pub problem: Problem,
    pub num_jobs: usize,
    pub num_machines: usize,
    pub min_proc_time: u32,
    pub max_proc_time: u32,
    pub mask_no_ops: bool,

    pub batch_size: usize,
    pub steps_per_epoch: usize,
    pub learning_rate: f64,
    pub eval_instances: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            seed: 1234,
            reports_folder: None,
            num_tasks: 4,
            alpha: 0.99,
            alpha_decay: 0.999,
            min_size: 5,
            max_size: 15,
            sch_bar: 0.9,
            data_type: "size".to_string(),
            problem: Problem::Jssp,
            num_jobs: 10,
            num_machines: 5,
            min_proc_time: 1,
            max_proc_time: 99,
            mask_no_ops: true,
            batch_size: 16,
            steps_per_epoch: 8,
            learning_rate: 1e-2,
            eval_instances: 32,
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| Error::config(key, format!("cannot parse '{value}': {e}"))),
    }
}

impl TrainConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let problem = match get("METACO_PROBLEM") {
            Some(value) => value.parse()?,
            None => d.problem,
        };

        let config = Self {
            max_epochs: parse("METACO_MAX_EPOCHS", get("METACO_MAX_EPOCHS"), d.max_epochs)?,
            seed: parse("METACO_SEED", get("METACO_SEED"), d.seed)?,
            reports_folder: get("METACO_REPORTS_FOLDER"),
            num_tasks: parse("METACO_NUM_TASKS", get("METACO_NUM_TASKS"), d.num_tasks)?,
            alpha: parse("METACO_ALPHA", get("METACO_ALPHA"), d.alpha)?,
            alpha_decay: parse("METACO_ALPHA_DECAY", get("METACO_ALPHA_DECAY"), d.alpha_decay)?,
            min_size: parse("METACO_MIN_SIZE", get("METACO_MIN_SIZE"), d.min_size)?,
            max_size: parse("METACO_MAX_SIZE", get("METACO_MAX_SIZE"), d.max_size)?,
            sch_bar: parse("METACO_SCH_BAR", get("METACO_SCH_BAR"), d.sch_bar)?,
            data_type: get("METACO_DATA_TYPE").unwrap_or(d.data_type),
            problem,
            num_jobs: parse("METACO_NUM_JOBS", get("METACO_NUM_JOBS"), d.num_jobs)?,
            num_machines: parse("METACO_NUM_MACHINES", get("METACO_NUM_MACHINES"), d.num_machines)?,
            min_proc_time: parse(
                "METACO_MIN_PROC_TIME",
                get("METACO_MIN_PROC_TIME"),
                d.min_proc_time,
            )?,
            max_proc_time: parse(
                "METACO_MAX_PROC_TIME",
                get("METACO_MAX_PROC_TIME"),
                d.max_proc_time,
            )?,
            mask_no_ops: parse("METACO_MASK_NO_OPS", get("METACO_MASK_NO_OPS"), d.mask_no_ops)?,
            batch_size: parse("METACO_BATCH_SIZE", get("METACO_BATCH_SIZE"), d.batch_size)?,
            steps_per_epoch: parse(
                "METACO_STEPS_PER_EPOCH",
                get("METACO_STEPS_PER_EPOCH"),
                d.steps_per_epoch,
            )?,
            learning_rate: parse(
                "METACO_LEARNING_RATE",
                get("METACO_LEARNING_RATE"),
                d.learning_rate,
            )?,
            eval_instances: parse(
                "METACO_EVAL_INSTANCES",
                get("METACO_EVAL_INSTANCES"),
                d.eval_instances,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Semantic checks; an unknown data type is reported as unsupported
    pub fn validate(&self) -> Result<()> {
        if self.num_tasks == 0 {
            return Err(Error::config("METACO_NUM_TASKS", "must be positive"));
        }
        if !(self.alpha > 0.0) {
            return Err(Error::config("METACO_ALPHA", "must be positive"));
        }
        if !(self.alpha_decay > 0.0 && self.alpha_decay <= 1.0) {
            return Err(Error::config("METACO_ALPHA_DECAY", "must be in (0, 1]"));
        }
        if self.min_size > self.max_size {
            return Err(Error::config(
                "METACO_MIN_SIZE",
                format!("{} exceeds METACO_MAX_SIZE {}", self.min_size, self.max_size),
            ));
        }
        if self.min_size == 0 {
            return Err(Error::config("METACO_MIN_SIZE", "must be positive"));
        }
        if !(self.sch_bar > 0.0 && self.sch_bar <= 1.0) {
            return Err(Error::config("METACO_SCH_BAR", "must be in (0, 1]"));
        }
        if self.min_proc_time == 0 || self.min_proc_time > self.max_proc_time {
            return Err(Error::config(
                "METACO_MIN_PROC_TIME",
                format!(
                    "processing time range {}..={} is empty or contains zero",
                    self.min_proc_time, self.max_proc_time
                ),
            ));
        }
        if self.num_jobs == 0 || self.num_machines == 0 {
            return Err(Error::config(
                "METACO_NUM_JOBS",
                "need at least one job and one machine",
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::config("METACO_BATCH_SIZE", "must be positive"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::config("METACO_LEARNING_RATE", "must be positive"));
        }
        if self.data_type != "size" {
            return Err(Error::UnsupportedConfiguration(format!(
                "task sampling strategy '{}' (only 'size' is supported)",
                self.data_type
            )));
        }
        Ok(())
    }

    pub fn reptile(&self) -> ReptileConfig {
        ReptileConfig {
            num_tasks: self.num_tasks,
            alpha: self.alpha,
            alpha_decay: self.alpha_decay,
            min_size: self.min_size,
            max_size: self.max_size,
            sch_bar: self.sch_bar,
            data_type: self.data_type.clone(),
            seed: self.seed,
        }
    }

    pub fn reinforce(&self) -> ReinforceConfig {
        ReinforceConfig {
            batch_size: self.batch_size,
            steps_per_epoch: self.steps_per_epoch,
            learning_rate: self.learning_rate,
            seed: self.seed.wrapping_add(1),
        }
    }
}
