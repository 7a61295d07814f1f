//! Bridge between burn modules and parameter snapshots.
//!
//! Float parameters are keyed `param.<i>` by their position in the module's
//! visit order, which is stable for a fixed module structure.

use burn::module::{Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::*;

use crate::error::{Error, Result};
use crate::meta::{ParamTensor, ParameterSnapshot};

fn param_key(index: usize) -> String {
    format!("param.{index}")
}

struct SnapshotVisitor {
    snapshot: ParameterSnapshot,
    index: usize,
}

impl<B: Backend> ModuleVisitor<B> for SnapshotVisitor {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let shape = tensor.dims().to_vec();
        let values: Vec<f32> = tensor.to_data().iter::<f32>().collect();
        self.snapshot
            .insert(param_key(self.index), ParamTensor { shape, values });
        self.index += 1;
    }
}

struct LoadMapper<'a> {
    snapshot: &'a ParameterSnapshot,
    index: usize,
    error: Option<Error>,
}

impl<B: Backend> ModuleMapper<B> for LoadMapper<'_> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let key = param_key(self.index);
        self.index += 1;
        if self.error.is_some() {
            return tensor;
        }

        let Some(stored) = self.snapshot.get(&key) else {
            self.error = Some(Error::mismatch(key, "missing from snapshot"));
            return tensor;
        };
        let dims = tensor.dims().to_vec();
        if stored.shape != dims {
            self.error = Some(Error::mismatch(
                key,
                format!("shape {:?} != module shape {:?}", stored.shape, dims),
            ));
            return tensor;
        }

        let data = TensorData::new(stored.values.clone(), stored.shape.clone());
        let loaded = Tensor::<B, D>::from_data(data, &tensor.device());
        if tensor.is_require_grad() {
            loaded.require_grad()
        } else {
            loaded
        }
    }
}

/// Copy every float parameter of `module` into a snapshot
pub fn snapshot_module<B: Backend, M: Module<B>>(module: &M) -> ParameterSnapshot {
    let mut visitor = SnapshotVisitor {
        snapshot: ParameterSnapshot::new(),
        index: 0,
    };
    module.visit(&mut visitor);
    visitor.snapshot
}

/// Overwrite every float parameter of `module` from `snapshot`. Fails on a
/// missing key, a shape mismatch or a snapshot with extra parameters.
pub fn load_module<B: Backend, M: Module<B>>(module: M, snapshot: &ParameterSnapshot) -> Result<M> {
    let mut mapper = LoadMapper {
        snapshot,
        index: 0,
        error: None,
    };
    let module = module.map(&mut mapper);
    if let Some(error) = mapper.error {
        return Err(error);
    }
    if mapper.index != snapshot.len() {
        return Err(Error::mismatch(
            param_key(mapper.index),
            format!(
                "snapshot holds {} parameters, module has {}",
                snapshot.len(),
                mapper.index
            ),
        ));
    }
    Ok(module)
}
