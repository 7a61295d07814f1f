//! Operation-eligibility engine shared by the job-shop environments.
//!
//! The engine owns the time/transition logic; environments only decide how a
//! discrete action index maps onto a (job, machine) dispatch.

use std::sync::Arc;

use crate::error::{Error, Result};

use super::instance::SchedulingInstance;

/// Dynamic per-episode scheduling state
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingState {
    instance: Arc<SchedulingInstance>,
    time: u32,
    /// Next (or currently running) operation per job
    next_op: Vec<usize>,
    /// Start time per operation, `None` until scheduled
    start_times: Vec<Option<u32>>,
    /// Finish time per operation, `None` until scheduled
    finish_times: Vec<Option<u32>>,
    /// Machine each operation was assigned to
    machine_of: Vec<Option<usize>>,
    /// Time at which each machine becomes idle
    busy_until: Vec<u32>,
    job_done: Vec<bool>,
    job_in_process: Vec<bool>,
    done: bool,
    steps: usize,
}

impl SchedulingState {
    fn new(instance: Arc<SchedulingInstance>) -> Self {
        let num_jobs = instance.num_jobs();
        let num_ops = instance.num_ops();
        let next_op = (0..num_jobs).map(|j| instance.first_op(j)).collect();
        let busy_until = vec![0; instance.num_machines()];

        Self {
            instance,
            time: 0,
            next_op,
            start_times: vec![None; num_ops],
            finish_times: vec![None; num_ops],
            machine_of: vec![None; num_ops],
            busy_until,
            job_done: vec![false; num_jobs],
            job_in_process: vec![false; num_jobs],
            done: false,
            steps: 0,
        }
    }

    pub fn instance(&self) -> &SchedulingInstance {
        &self.instance
    }

    pub fn shared_instance(&self) -> Arc<SchedulingInstance> {
        Arc::clone(&self.instance)
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn num_jobs(&self) -> usize {
        self.job_done.len()
    }

    pub fn num_machines(&self) -> usize {
        self.busy_until.len()
    }

    pub fn next_op(&self, job: usize) -> usize {
        self.next_op[job]
    }

    pub fn start_time(&self, op: usize) -> Option<u32> {
        self.start_times[op]
    }

    pub fn finish_time(&self, op: usize) -> Option<u32> {
        self.finish_times[op]
    }

    pub fn machine_of(&self, op: usize) -> Option<usize> {
        self.machine_of[op]
    }

    pub fn busy_until(&self) -> &[u32] {
        &self.busy_until
    }

    pub fn is_job_done(&self, job: usize) -> bool {
        self.job_done[job]
    }

    pub fn is_job_in_process(&self, job: usize) -> bool {
        self.job_in_process[job]
    }

    /// Job is neither done nor in process
    pub fn is_job_idle(&self, job: usize) -> bool {
        !self.job_done[job] && !self.job_in_process[job]
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of accepted steps since reset
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_machine_idle(&self, machine: usize) -> bool {
        self.busy_until[machine] <= self.time
    }

    /// Number of operations that have been dispatched
    pub fn num_scheduled(&self) -> usize {
        self.finish_times.iter().filter(|f| f.is_some()).count()
    }

    /// Shortest processing time of the job's not yet scheduled operations, summed
    pub fn remaining_work(&self, job: usize) -> u64 {
        if self.job_done[job] {
            return 0;
        }
        let ops = self.instance.job_ops(job);
        ops.filter(|&op| self.finish_times[op].is_none())
            .map(|op| self.instance.min_proc_time(op) as u64)
            .sum()
    }

    /// Number of the job's operations that have not been dispatched
    pub fn remaining_ops(&self, job: usize) -> usize {
        self.instance
            .job_ops(job)
            .filter(|&op| self.finish_times[op].is_none())
            .count()
    }

    /// Makespan so far: the latest time any machine is busy until
    pub fn makespan(&self) -> u32 {
        self.busy_until.iter().copied().max().unwrap_or(0)
    }
}

/// Transition and feasibility rules for a scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    /// When set, waiting is never offered while work remains
    pub mask_no_ops: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self { mask_no_ops: true }
    }
}

impl Engine {
    pub fn new(mask_no_ops: bool) -> Self {
        Self { mask_no_ops }
    }

    /// Fresh state for an instance, settled so a feasible action exists
    pub fn reset(&self, instance: Arc<SchedulingInstance>) -> Result<SchedulingState> {
        let mut state = SchedulingState::new(instance);
        self.settle(&mut state)?;
        Ok(state)
    }

    /// Whether `job` can start its next operation on `machine` right now
    pub fn can_dispatch(&self, state: &SchedulingState, job: usize, machine: usize) -> bool {
        job < state.num_jobs()
            && machine < state.num_machines()
            && state.is_job_idle(job)
            && state.is_machine_idle(machine)
            && state.instance.is_eligible(machine, state.next_op[job])
    }

    /// Job × machine feasibility matrix
    pub fn availability(&self, state: &SchedulingState) -> Vec<Vec<bool>> {
        (0..state.num_jobs())
            .map(|job| {
                (0..state.num_machines())
                    .map(|machine| self.can_dispatch(state, job, machine))
                    .collect()
            })
            .collect()
    }

    /// First idle machine eligible for the job's next operation
    pub fn first_available_machine(&self, state: &SchedulingState, job: usize) -> Option<usize> {
        if job >= state.num_jobs() || !state.is_job_idle(job) {
            return None;
        }
        let op = state.next_op[job];
        state
            .instance
            .eligible_machines(op)
            .find(|&m| state.is_machine_idle(m))
    }

    pub fn job_feasible(&self, state: &SchedulingState, job: usize) -> bool {
        self.first_available_machine(state, job).is_some()
    }

    pub fn no_op_feasible(&self, state: &SchedulingState) -> bool {
        if state.done {
            return true;
        }
        if self.mask_no_ops {
            false
        } else {
            state.job_in_process.iter().any(|&p| p)
        }
    }

    /// Whether any dispatch or the no-op is currently feasible
    pub fn any_feasible(&self, state: &SchedulingState) -> bool {
        self.no_op_feasible(state) || (0..state.num_jobs()).any(|j| self.job_feasible(state, j))
    }

    /// Start the job's next operation on the machine at the current time
    pub fn dispatch(&self, state: &mut SchedulingState, job: usize, machine: usize) -> Result<()> {
        if state.done {
            return Err(Error::InvalidTransition(
                "cannot dispatch on a finished schedule".to_string(),
            ));
        }
        if !self.can_dispatch(state, job, machine) {
            return Err(Error::InvalidAction {
                action: job,
                reason: format!("job {job} cannot start on machine {machine} at t={}", state.time),
            });
        }

        let op = state.next_op[job];
        let duration = state.instance.proc_time(machine, op);
        let finish = state.time.checked_add(duration).ok_or_else(|| {
            Error::InvalidInstance(format!(
                "operation {op} finishing after t={} overflows the time range",
                state.time
            ))
        })?;

        state.start_times[op] = Some(state.time);
        state.finish_times[op] = Some(finish);
        state.machine_of[op] = Some(machine);
        state.busy_until[machine] = finish;
        state.job_in_process[job] = true;

        tracing::trace!(job, op, machine, start = state.time, finish, "dispatched operation");
        Ok(())
    }

    /// Let time pass until the next machine becomes idle
    pub fn wait(&self, state: &mut SchedulingState) -> Result<()> {
        if state.done {
            return Err(Error::InvalidTransition(
                "cannot wait on a finished schedule".to_string(),
            ));
        }
        self.advance_time(state)
    }

    /// Advance time while nothing can be decided, or when every remaining
    /// operation is already running and only completion is left.
    pub fn settle(&self, state: &mut SchedulingState) -> Result<()> {
        while !state.done && (!self.any_feasible(state) || Self::all_dispatched(state)) {
            self.advance_time(state)?;
        }
        Ok(())
    }

    /// Record one accepted agent step
    pub(crate) fn count_step(&self, state: &mut SchedulingState) {
        state.steps += 1;
    }

    fn all_dispatched(state: &SchedulingState) -> bool {
        (0..state.num_jobs()).all(|job| {
            state.job_done[job]
                || (state.job_in_process[job]
                    && state.next_op[job] == state.instance.last_op(job))
        })
    }

    fn advance_time(&self, state: &mut SchedulingState) -> Result<()> {
        let next_time = state
            .busy_until
            .iter()
            .copied()
            .filter(|&t| t > state.time)
            .min()
            .ok_or_else(|| {
                Error::InvalidTransition(format!(
                    "no machine becomes idle after t={} but the schedule is unfinished",
                    state.time
                ))
            })?;

        state.time = next_time;

        for job in 0..state.num_jobs() {
            if !state.job_in_process[job] {
                continue;
            }
            let op = state.next_op[job];
            let finished = state.finish_times[op].is_some_and(|f| f <= state.time);
            if !finished {
                continue;
            }
            state.job_in_process[job] = false;
            if op == state.instance.last_op(job) {
                state.job_done[job] = true;
            } else {
                state.next_op[job] = op + 1;
            }
        }

        state.done = state.job_done.iter().all(|&d| d);
        tracing::trace!(time = state.time, done = state.done, "advanced time");
        Ok(())
    }
}
