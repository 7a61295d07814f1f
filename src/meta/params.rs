//! Named parameter snapshots and the model/optimizer boundary of the meta loop

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A flat tensor value with its shape
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(Error::mismatch(
                format!("{shape:?}"),
                format!("shape holds {expected} values but {} were given", values.len()),
            ));
        }
        Ok(Self { shape, values })
    }

    pub fn vector(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Mapping from parameter name to tensor value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSnapshot {
    params: BTreeMap<String, ParamTensor>,
}

impl ParameterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ParamTensor) {
        self.params.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&ParamTensor> {
        self.params.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamTensor)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar values
    pub fn num_values(&self) -> usize {
        self.params.values().map(ParamTensor::len).sum()
    }

    /// Look up `key` with the same shape as `reference`
    fn matching(&self, key: &str, reference: &ParamTensor) -> Result<&ParamTensor> {
        let tensor = self
            .params
            .get(key)
            .ok_or_else(|| Error::mismatch(key, "missing from snapshot"))?;
        if tensor.shape != reference.shape {
            return Err(Error::mismatch(
                key,
                format!("shape {:?} != expected {:?}", tensor.shape, reference.shape),
            ));
        }
        Ok(tensor)
    }

    /// Check that `other` has every key of `self` with the same shape
    pub fn ensure_compatible(&self, other: &ParameterSnapshot) -> Result<()> {
        for (key, tensor) in &self.params {
            other.matching(key, tensor)?;
        }
        Ok(())
    }

    /// Element-wise `other - self` over the keys of `self`
    pub fn delta(&self, other: &ParameterSnapshot) -> Result<ParameterSnapshot> {
        self.params
            .iter()
            .map(|(key, base)| {
                let target = other.matching(key, base)?;
                let values = target
                    .values
                    .iter()
                    .zip(&base.values)
                    .map(|(t, b)| t - b)
                    .collect();
                Ok((
                    key.clone(),
                    ParamTensor {
                        shape: base.shape.clone(),
                        values,
                    },
                ))
            })
            .collect()
    }

    /// `self += a * other`, for every key of `self`
    pub fn axpy(&mut self, a: f32, other: &ParameterSnapshot) -> Result<()> {
        self.ensure_compatible(other)?;
        for (key, tensor) in &mut self.params {
            for (v, o) in tensor.values.iter_mut().zip(&other.params[key].values) {
                *v += a * o;
            }
        }
        Ok(())
    }

    /// Mean of `snapshots[t] - self` over all snapshots
    pub fn mean_delta(&self, snapshots: &[ParameterSnapshot]) -> Result<ParameterSnapshot> {
        if snapshots.is_empty() {
            return Err(Error::InvalidTransition(
                "outer-loop update needs at least one task snapshot".to_string(),
            ));
        }
        let mut mean = ParameterSnapshot::new();
        for (key, tensor) in &self.params {
            mean.insert(key.clone(), ParamTensor::zeros(tensor.shape.clone()));
        }
        let weight = 1.0 / snapshots.len() as f32;
        for snapshot in snapshots {
            mean.axpy(weight, &self.delta(snapshot)?)?;
        }
        Ok(mean)
    }

    /// Reptile outer update: `self[k] += alpha * mean_t(snapshots[t][k] - self[k])`
    /// for every key of `self`. Fails without modifying `self` if any snapshot
    /// misses a key or disagrees on a shape.
    pub fn reptile_update(&mut self, snapshots: &[ParameterSnapshot], alpha: f32) -> Result<()> {
        let mean = self.mean_delta(snapshots)?;
        self.axpy(alpha, &mean)
    }

    /// Largest absolute element-wise difference to `other` over shared keys
    pub fn max_abs_diff(&self, other: &ParameterSnapshot) -> Result<f32> {
        self.ensure_compatible(other)?;
        Ok(self
            .params
            .iter()
            .flat_map(|(key, tensor)| {
                tensor
                    .values
                    .iter()
                    .zip(&other.params[key].values)
                    .map(|(a, b)| (a - b).abs())
            })
            .fold(0.0, f32::max))
    }
}

impl FromIterator<(String, ParamTensor)> for ParameterSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ParamTensor)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Read and overwrite the live model parameters
pub trait ParameterStore {
    fn parameters(&self) -> ParameterSnapshot;

    /// Replace the live parameters. Must fail on a structural mismatch.
    fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()>;
}

/// Model as seen by the meta loop: parameters plus a replaceable optimizer
pub trait MetaModel: ParameterStore {
    /// Learning rate of the current optimizer
    fn learning_rate(&self) -> f64;

    /// Replace the optimizer with a fresh instance over the current parameters
    fn rebuild_optimizer(&mut self, learning_rate: f64);
}
