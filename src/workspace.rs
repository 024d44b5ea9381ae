//! Shared workspace threaded through every stack call.
//!
//! The [`Workspace`] owns the weight table (the only shared mutable
//! resource), the loss function, the running statistics, and the declared
//! feature crosses. It is written exclusively by the single learning
//! thread, so no internal locking exists anywhere in the core.

use crate::config::Config;
use crate::error::Result;
use crate::features::Interactions;
use crate::loss::{loss_by_name, LossFunction};
use crate::stats::SharedStats;
use crate::weights::WeightVector;

/// Everything a learner layer can reach besides its own private state.
pub struct Workspace {
    /// The flat trainable weight table.
    pub weights: WeightVector,
    /// Loss for final-prediction bookkeeping and gradient computation.
    /// Layers may temporarily swap this for synthetic sub-calls, restoring
    /// it before returning.
    pub loss: Box<dyn LossFunction>,
    /// Running accounting shared by the whole stack.
    pub sd: SharedStats,
    /// Declared quadratic/cubic namespace crosses.
    pub interactions: Interactions,
    /// Train when label data is available.
    pub training: bool,
    /// Suppress progress printing.
    pub quiet: bool,
    /// Learning rate; decayed at pass boundaries.
    pub eta: f32,
    /// Multiplicative per-pass learning-rate decay.
    pub eta_decay_rate: f32,
    /// Initial example-counter position.
    pub initial_t: f32,
    /// Power on learning-rate decay in t.
    pub power_t: f32,
    /// Adaptive per-feature learning rates.
    pub adaptive: bool,
    /// Cumulative importance weight seen by the base learner.
    pub t: f64,
    /// Current pass number.
    pub current_pass: usize,
    /// Number of passes to run.
    pub passes: usize,
    /// Additive rather than multiplicative progress rows.
    pub progress_add: bool,
    /// Progress dump argument.
    pub progress_arg: f32,
}

impl Workspace {
    /// Builds a workspace from a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails on configuration conflicts; training never begins.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut weights = WeightVector::new(config.num_bits, config.stride_shift());
        if config.random_weights {
            weights.randomize(config.random_seed);
        }
        Ok(Self {
            weights,
            loss: loss_by_name(&config.loss)?,
            sd: SharedStats::new(),
            interactions: Interactions {
                pairs: config.pair_bytes(),
                triples: config.triple_bytes(),
            },
            training: config.training,
            quiet: config.quiet,
            eta: config.eta,
            eta_decay_rate: config.eta_decay_rate,
            initial_t: config.initial_t,
            power_t: config.power_t,
            adaptive: config.adaptive,
            t: f64::from(config.initial_t),
            current_pass: 0,
            passes: config.passes,
            progress_add: config.progress_add,
            progress_arg: config.progress_arg,
        })
    }
}
