//! Priority dispatching rules used as comparison baselines

use std::fmt;
use std::str::FromStr;

use crate::env::{Environment, SchedulingState, NO_OP};
use crate::error::Error;

use super::features::candidate;
use super::Policy;

/// Score given to waiting, so every rule prefers dispatching when it can
const WAIT_SCORE: f32 = -1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchRule {
    /// Shortest processing time of the next operation
    Spt,
    /// Longest processing time of the next operation
    Lpt,
    /// Most work remaining
    Mwkr,
    /// Most operations remaining
    Mor,
}

impl DispatchRule {
    pub const ALL: [DispatchRule; 4] = [
        DispatchRule::Spt,
        DispatchRule::Lpt,
        DispatchRule::Mwkr,
        DispatchRule::Mor,
    ];
}

impl fmt::Display for DispatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchRule::Spt => "SPT",
            DispatchRule::Lpt => "LPT",
            DispatchRule::Mwkr => "MWKR",
            DispatchRule::Mor => "MOR",
        };
        f.write_str(name)
    }
}

impl FromStr for DispatchRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spt" => Ok(DispatchRule::Spt),
            "lpt" => Ok(DispatchRule::Lpt),
            "mwkr" => Ok(DispatchRule::Mwkr),
            "mor" => Ok(DispatchRule::Mor),
            other => Err(Error::UnsupportedConfiguration(format!(
                "dispatch rule '{other}'"
            ))),
        }
    }
}

impl Policy for DispatchRule {
    fn name(&self) -> String {
        self.to_string()
    }

    fn logits(&self, env: &dyn Environment, state: &SchedulingState) -> Vec<f32> {
        (0..env.num_actions(state))
            .map(|action| {
                if action == NO_OP {
                    return WAIT_SCORE;
                }
                match candidate(env, state, action) {
                    Some(c) => match self {
                        DispatchRule::Spt => -(c.proc_time as f32),
                        DispatchRule::Lpt => c.proc_time as f32,
                        DispatchRule::Mwkr => c.remaining_work as f32,
                        DispatchRule::Mor => c.remaining_ops as f32,
                    },
                    None => WAIT_SCORE,
                }
            })
            .collect()
    }
}
