//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use caudal::prelude::*;
//! ```

pub use crate::config::Config;
pub use crate::driver::{bounded_channel, run, ExampleSource, VecSource};
pub use crate::error::{CaudalError, Result};
pub use crate::example::{Example, Feature, Label, Prediction, SimpleLabel};
pub use crate::learner::{build_stack, Learner};
pub use crate::model::{load_model, save_model};
pub use crate::workspace::Workspace;
