//! Action masks - feasibility over the discrete action space

/// Index of the no-op (wait) action in every environment
pub const NO_OP: usize = 0;

/// Feasibility of every action for the current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMask {
    /// Validity mask (true = feasible)
    mask: Vec<bool>,
    /// Number of feasible actions
    num_valid: usize,
}

impl ActionMask {
    pub fn new(mask: Vec<bool>) -> Self {
        let num_valid = mask.iter().filter(|&&v| v).count();
        Self { mask, num_valid }
    }

    /// Get the validity mask as a slice of bools
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Get the validity mask as a float array (1.0 = feasible, 0.0 = infeasible)
    pub fn as_floats(&self) -> Vec<f32> {
        self.mask
            .iter()
            .map(|&v| if v { 1.0 } else { 0.0 })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn is_feasible(&self, action: usize) -> bool {
        self.mask.get(action).copied().unwrap_or(false)
    }

    pub fn num_valid(&self) -> usize {
        self.num_valid
    }

    /// Check if any action is available
    pub fn has_actions(&self) -> bool {
        self.num_valid > 0
    }

    /// Iterate over feasible action indices
    pub fn iter_valid(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(|(i, _)| i)
    }
}
