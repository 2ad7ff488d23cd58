#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod data;
pub mod group;
pub mod model;
pub mod schema;
pub mod score;
pub mod trend;
pub mod value;

pub use model::{WeightModel, build_risk_model, build_weight_model};
pub use score::{Profile, normalized_confidence};
