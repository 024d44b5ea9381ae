//! Caudal: streaming online machine learning with hashed features.
//!
//! Caudal learns from a stream of sparse examples one at a time, with
//! memory fixed up front: every trainable parameter lives in a single
//! `2^b`-address weight table, and feature indices are hashes that wrap
//! into the table instead of growing it. Learning algorithms compose as a
//! stack of layers over one shared table, each layer carving out its own
//! address sub-ranges by offsetting the example it passes down.
//!
//! # Quick Start
//!
//! ```
//! use caudal::prelude::*;
//!
//! let config = Config::new().with_bits(18).with_learning_rate(0.5);
//! let mut ws = Workspace::new(&config).unwrap();
//! let mut stack = build_stack(&config).unwrap();
//!
//! // Learn y = 1 from a single feature, one example at a time.
//! for _ in 0..100 {
//!     let mut ec = Example::new();
//!     ec.push_feature(b'a', Feature::new(1.0, 42));
//!     ec.push_constant();
//!     ec.label = Label::Simple(SimpleLabel::new(1.0));
//!     stack.learn(&mut ws, &mut ec, 0);
//! }
//!
//! let mut probe = Example::new();
//! probe.push_feature(b'a', Feature::new(1.0, 42));
//! probe.push_constant();
//! stack.predict(&mut ws, &mut probe, 0);
//! assert!((probe.pred.scalar() - 1.0).abs() < 0.05);
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration with pre-training validation
//! - [`example`]: The shared mutable example record
//! - [`weights`]: The flat masked weight table
//! - [`features`]: Feature iteration and cross-feature expansion
//! - [`loss`]: Loss functions
//! - [`learner`]: The learner composition stack (gd, scorer, nn, oaa)
//! - [`workspace`]: Shared state threaded through every stack call
//! - [`driver`]: The outer learning loop and example sources
//! - [`model`]: Model persistence
//! - [`stats`]: Running-loss accounting and progress reporting

pub mod config;
pub mod driver;
pub mod error;
pub mod example;
pub mod features;
pub mod learner;
pub mod loss;
pub mod model;
pub mod prelude;
pub mod stats;
pub mod weights;
pub mod workspace;

pub use config::Config;
pub use error::{CaudalError, Result};
pub use workspace::Workspace;
