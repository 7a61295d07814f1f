//! Neural dispatch policy trained with burn autodiff

pub mod learner;
pub mod net;
pub mod params;

pub use learner::{BurnLearner, ReinforceConfig};
pub use net::{action_logits, action_rows, DispatchNet, DispatchNetConfig, NET_INPUT_SIZE};
pub use params::{load_module, snapshot_module};
