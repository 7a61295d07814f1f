//! Instance generators. The meta loop retargets a generator between epochs
//! through [`Generator::apply`]; the change is picked up by the next
//! `generate` call and never touches instances already handed out.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::task::TaskConfig;

use super::instance::{OperationSpec, SchedulingInstance};

/// Problem instance generator driven by a task configuration
pub trait Generator {
    type Instance;

    /// Task configuration the generator currently produces
    fn task(&self) -> TaskConfig;

    /// Retarget the generator: sets the size and, when the generator has one,
    /// the capacity derived from the task.
    fn apply(&mut self, task: &TaskConfig);

    /// Vehicle capacity, for generators that have one
    fn capacity(&self) -> Option<u32> {
        None
    }

    /// Draw one instance with the current configuration
    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self::Instance>;

    fn generate_batch<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<Self::Instance>> {
        (0..batch_size).map(|_| self.generate(rng)).collect()
    }
}

/// Random job-shop instances: every job visits every machine once
#[derive(Debug, Clone, PartialEq)]
pub struct JsspGenerator {
    pub num_jobs: usize,
    pub num_machines: usize,
    pub min_proc_time: u32,
    pub max_proc_time: u32,
}

impl Default for JsspGenerator {
    fn default() -> Self {
        Self {
            num_jobs: 10,
            num_machines: 5,
            min_proc_time: 1,
            max_proc_time: 99,
        }
    }
}

impl JsspGenerator {
    pub fn new(
        num_jobs: usize,
        num_machines: usize,
        min_proc_time: u32,
        max_proc_time: u32,
    ) -> Result<Self> {
        validate_shape(num_jobs, num_machines, min_proc_time, max_proc_time)?;
        Ok(Self {
            num_jobs,
            num_machines,
            min_proc_time,
            max_proc_time,
        })
    }
}

impl Generator for JsspGenerator {
    type Instance = Arc<SchedulingInstance>;

    fn task(&self) -> TaskConfig {
        TaskConfig::new(self.num_jobs)
    }

    fn apply(&mut self, task: &TaskConfig) {
        self.num_jobs = task.size;
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self::Instance> {
        validate_shape(self.num_jobs, self.num_machines, self.min_proc_time, self.max_proc_time)?;
        let routes = (0..self.num_jobs)
            .map(|_| {
                let mut order: Vec<usize> = (0..self.num_machines).collect();
                order.shuffle(rng);
                order
                    .into_iter()
                    .map(|m| (m, rng.random_range(self.min_proc_time..=self.max_proc_time)))
                    .collect()
            })
            .collect();

        Ok(Arc::new(SchedulingInstance::job_shop(self.num_machines, routes)?))
    }
}

/// Random flexible job-shop instances
#[derive(Debug, Clone, PartialEq)]
pub struct FjspGenerator {
    pub num_jobs: usize,
    pub num_machines: usize,
    pub min_ops_per_job: usize,
    pub max_ops_per_job: usize,
    pub min_eligible: usize,
    pub max_eligible: usize,
    pub min_proc_time: u32,
    pub max_proc_time: u32,
}

impl Default for FjspGenerator {
    fn default() -> Self {
        Self {
            num_jobs: 10,
            num_machines: 5,
            min_ops_per_job: 4,
            max_ops_per_job: 6,
            min_eligible: 1,
            max_eligible: 5,
            min_proc_time: 1,
            max_proc_time: 20,
        }
    }
}

impl FjspGenerator {
    pub fn new(
        num_jobs: usize,
        num_machines: usize,
        min_proc_time: u32,
        max_proc_time: u32,
    ) -> Result<Self> {
        validate_shape(num_jobs, num_machines, min_proc_time, max_proc_time)?;
        Ok(Self {
            num_jobs,
            num_machines,
            min_ops_per_job: num_machines.div_ceil(2).max(1),
            max_ops_per_job: num_machines,
            min_eligible: 1,
            max_eligible: num_machines,
            min_proc_time,
            max_proc_time,
        })
    }
}

impl Generator for FjspGenerator {
    type Instance = Arc<SchedulingInstance>;

    fn task(&self) -> TaskConfig {
        TaskConfig::new(self.num_jobs)
    }

    fn apply(&mut self, task: &TaskConfig) {
        self.num_jobs = task.size;
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self::Instance> {
        validate_shape(self.num_jobs, self.num_machines, self.min_proc_time, self.max_proc_time)?;
        let min_eligible = self.min_eligible.clamp(1, self.num_machines);
        let max_eligible = self.max_eligible.clamp(min_eligible, self.num_machines);
        let min_ops = self.min_ops_per_job.max(1);
        let max_ops = self.max_ops_per_job.max(min_ops);

        let jobs: Vec<Vec<OperationSpec>> = (0..self.num_jobs)
            .map(|_| {
                let num_ops = rng.random_range(min_ops..=max_ops);
                (0..num_ops)
                    .map(|_| {
                        let mut machines: Vec<usize> = (0..self.num_machines).collect();
                        machines.shuffle(rng);
                        machines.truncate(rng.random_range(min_eligible..=max_eligible));
                        machines.sort_unstable();
                        machines
                            .into_iter()
                            .map(|m| (m, rng.random_range(self.min_proc_time..=self.max_proc_time)))
                            .collect()
                    })
                    .collect()
            })
            .collect();

        Ok(Arc::new(SchedulingInstance::new(self.num_machines, jobs)?))
    }
}

/// Capacitated routing instance
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingInstance {
    pub depot: (f32, f32),
    pub locs: Vec<(f32, f32)>,
    pub demands: Vec<u32>,
    pub capacity: u32,
}

impl RoutingInstance {
    pub fn num_loc(&self) -> usize {
        self.locs.len()
    }

    /// Lower bound on the number of tours needed to serve all demand
    pub fn min_tours(&self) -> u32 {
        let total: u32 = self.demands.iter().sum();
        total.div_ceil(self.capacity.max(1))
    }
}

/// Random capacitated routing instances in the unit square
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingGenerator {
    pub num_loc: usize,
    pub capacity: u32,
    pub min_demand: u32,
    pub max_demand: u32,
}

impl Default for RoutingGenerator {
    fn default() -> Self {
        let task = TaskConfig::new(20);
        Self {
            num_loc: task.size,
            capacity: task.capacity(),
            min_demand: 1,
            max_demand: 9,
        }
    }
}

impl Generator for RoutingGenerator {
    type Instance = RoutingInstance;

    fn task(&self) -> TaskConfig {
        TaskConfig::new(self.num_loc)
    }

    fn apply(&mut self, task: &TaskConfig) {
        self.num_loc = task.size;
        self.capacity = task.capacity();
    }

    fn capacity(&self) -> Option<u32> {
        Some(self.capacity)
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self::Instance> {
        if self.min_demand > self.max_demand {
            return Err(Error::InvalidInstance(format!(
                "demand range {}..={} is empty",
                self.min_demand, self.max_demand
            )));
        }
        let mut point = || (rng.random::<f32>(), rng.random::<f32>());
        let depot = point();
        let locs = (0..self.num_loc).map(|_| point()).collect();
        let demands = (0..self.num_loc)
            .map(|_| rng.random_range(self.min_demand..=self.max_demand))
            .collect();

        Ok(RoutingInstance {
            depot,
            locs,
            demands,
            capacity: self.capacity,
        })
    }
}

fn validate_shape(
    num_jobs: usize,
    num_machines: usize,
    min_proc_time: u32,
    max_proc_time: u32,
) -> Result<()> {
    if num_jobs == 0 || num_machines == 0 {
        return Err(Error::InvalidInstance(format!(
            "need at least one job and one machine, got {num_jobs}x{num_machines}"
        )));
    }
    if min_proc_time == 0 || min_proc_time > max_proc_time {
        return Err(Error::InvalidInstance(format!(
            "processing time range {min_proc_time}..={max_proc_time} is empty or contains zero"
        )));
    }
    Ok(())
}
