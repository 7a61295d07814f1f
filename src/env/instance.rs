//! Static scheduling instance: jobs, operations and the operation↔machine adjacency

use std::ops::Range;

use crate::error::{Error, Result};

/// One operation: the machines that can process it and how long each takes
pub type OperationSpec = Vec<(usize, u32)>;

/// Immutable problem data shared by every state of an episode
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingInstance {
    num_jobs: usize,
    num_machines: usize,
    /// Processing time per [machine][operation], 0 = machine not eligible
    proc_times: Vec<Vec<u32>>,
    /// Operation ids belonging to each job, in processing order
    job_ops: Vec<Range<usize>>,
    /// Owning job per operation
    op_job: Vec<usize>,
}

impl SchedulingInstance {
    /// Build an instance from per-job operation lists.
    pub fn new(num_machines: usize, jobs: Vec<Vec<OperationSpec>>) -> Result<Self> {
        if jobs.is_empty() {
            return Err(Error::InvalidInstance("instance has no jobs".to_string()));
        }
        if num_machines == 0 {
            return Err(Error::InvalidInstance("instance has no machines".to_string()));
        }

        let num_ops: usize = jobs.iter().map(Vec::len).sum();
        let mut proc_times = vec![vec![0u32; num_ops]; num_machines];
        let mut job_ops = Vec::with_capacity(jobs.len());
        let mut op_job = Vec::with_capacity(num_ops);

        let mut op = 0;
        for (job, operations) in jobs.iter().enumerate() {
            if operations.is_empty() {
                return Err(Error::InvalidInstance(format!("job {job} has no operations")));
            }
            let start = op;
            for spec in operations {
                if spec.is_empty() {
                    return Err(Error::InvalidInstance(format!(
                        "operation {op} of job {job} has no eligible machine"
                    )));
                }
                for &(machine, duration) in spec {
                    if machine >= num_machines {
                        return Err(Error::InvalidInstance(format!(
                            "operation {op} references machine {machine} of {num_machines}"
                        )));
                    }
                    if duration == 0 {
                        return Err(Error::InvalidInstance(format!(
                            "operation {op} has zero processing time on machine {machine}"
                        )));
                    }
                    proc_times[machine][op] = duration;
                }
                op_job.push(job);
                op += 1;
            }
            job_ops.push(start..op);
        }

        // every start and finish time is bounded by the summed longest durations
        let horizon: u64 = (0..num_ops)
            .map(|op| proc_times.iter().map(|row| row[op] as u64).max().unwrap_or(0))
            .sum();
        if horizon > u32::MAX as u64 {
            return Err(Error::InvalidInstance(format!(
                "summed processing time {horizon} exceeds the time range of {}",
                u32::MAX
            )));
        }

        Ok(Self {
            num_jobs: jobs.len(),
            num_machines,
            proc_times,
            job_ops,
            op_job,
        })
    }

    /// Classic job-shop instance: each operation runs on exactly one machine.
    /// `routes[j]` is the ordered list of `(machine, processing time)` for job `j`.
    pub fn job_shop(num_machines: usize, routes: Vec<Vec<(usize, u32)>>) -> Result<Self> {
        let jobs = routes
            .into_iter()
            .map(|route| route.into_iter().map(|step| vec![step]).collect())
            .collect();
        Self::new(num_machines, jobs)
    }

    pub fn num_jobs(&self) -> usize {
        self.num_jobs
    }

    pub fn num_machines(&self) -> usize {
        self.num_machines
    }

    pub fn num_ops(&self) -> usize {
        self.op_job.len()
    }

    /// Processing time of `op` on `machine`, 0 when the machine is not eligible
    pub fn proc_time(&self, machine: usize, op: usize) -> u32 {
        self.proc_times[machine][op]
    }

    pub fn is_eligible(&self, machine: usize, op: usize) -> bool {
        self.proc_times[machine][op] > 0
    }

    /// Machines able to process `op`, in index order
    pub fn eligible_machines(&self, op: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_machines).filter(move |&m| self.proc_times[m][op] > 0)
    }

    /// Shortest processing time of `op` over its eligible machines
    pub fn min_proc_time(&self, op: usize) -> u32 {
        self.eligible_machines(op)
            .map(|m| self.proc_times[m][op])
            .min()
            .unwrap_or(0)
    }

    pub fn job_ops(&self, job: usize) -> Range<usize> {
        self.job_ops[job].clone()
    }

    pub fn first_op(&self, job: usize) -> usize {
        self.job_ops[job].start
    }

    pub fn last_op(&self, job: usize) -> usize {
        self.job_ops[job].end - 1
    }

    pub fn job_of(&self, op: usize) -> usize {
        self.op_job[op]
    }

    /// Sum over operations of their shortest processing time
    pub fn total_work(&self) -> u64 {
        (0..self.num_ops()).map(|op| self.min_proc_time(op) as u64).sum()
    }

    /// Largest processing time of any operation-machine pair
    pub fn max_proc_time(&self) -> u32 {
        self.proc_times
            .iter()
            .flat_map(|row| row.iter().copied())
            .max()
            .unwrap_or(0)
    }
}
