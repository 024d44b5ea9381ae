//! Engine configuration with pre-training validation.
//!
//! A [`Config`] is built with `with_*` setters (or deserialized via serde)
//! and checked once by [`Config::validate`] before any example is
//! processed: conflicting options are fatal configuration errors, training
//! never begins on a bad configuration. Runtime label issues, by contrast,
//! warn and recover locally.

use serde::{Deserialize, Serialize};

use crate::error::{CaudalError, Result};

/// Full configuration for a caudal workspace and learner stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// log2 of the number of logical weight addresses.
    pub num_bits: u32,
    /// Learning rate.
    pub eta: f32,
    /// Multiplicative per-pass learning-rate decay.
    pub eta_decay_rate: f32,
    /// Initial example-counter position for rate schedules.
    pub initial_t: f32,
    /// Power on learning-rate decay in t.
    pub power_t: f32,
    /// Number of passes over the data.
    pub passes: usize,
    /// Adaptive per-feature learning rates (reserves an auxiliary stride slot).
    pub adaptive: bool,
    /// Train when label data is available.
    pub training: bool,
    /// Suppress progress printing.
    pub quiet: bool,
    /// Additive rather than multiplicative progress rows.
    pub progress_add: bool,
    /// Progress dump argument.
    pub progress_arg: f32,
    /// Loss function name.
    pub loss: String,
    /// Link function name: identity, logistic, or glf1.
    pub link: String,
    /// Namespace pairs to cross quadratically, e.g. `["ab"]`.
    pub pairs: Vec<String>,
    /// Namespace triples to cross cubically, e.g. `["abc"]`.
    pub triples: Vec<String>,
    /// N-gram declarations (parser collaborator consumes these).
    pub ngram: Vec<String>,
    /// Skip declarations; only meaningful together with `ngram`.
    pub skips: Vec<String>,
    /// Add the implicit constant feature.
    pub add_constant: bool,
    /// Initialize weights uniformly at random instead of zero.
    pub random_weights: bool,
    /// Seed for every deterministic pseudo-random stream.
    pub random_seed: u64,
    /// Hidden-unit count for the sigmoidal feedforward layer; 0 disables it.
    pub nn_units: u32,
    /// Train the feedforward layer with dropout.
    pub nn_dropout: bool,
    /// Feed hidden activations back into the input example.
    pub nn_inpass: bool,
    /// Share the hidden layer across all reduced tasks.
    pub nn_multitask: bool,
    /// Class count for one-against-all; 0 disables it.
    pub oaa_classes: u32,
    /// Negatives subsampled per one-against-all update; 0 learns all.
    pub oaa_subsample: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_bits: 18,
            eta: 0.5,
            eta_decay_rate: 1.0,
            initial_t: 0.0,
            power_t: 0.5,
            passes: 1,
            adaptive: false,
            training: true,
            quiet: false,
            progress_add: false,
            progress_arg: 2.0,
            loss: "squared".to_string(),
            link: "identity".to_string(),
            pairs: Vec::new(),
            triples: Vec::new(),
            ngram: Vec::new(),
            skips: Vec::new(),
            add_constant: true,
            random_weights: false,
            random_seed: 0,
            nn_units: 0,
            nn_dropout: false,
            nn_inpass: false,
            nn_multitask: false,
            oaa_classes: 0,
            oaa_subsample: 0,
        }
    }
}

impl Config {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the weight-table size as log2 of the address count.
    #[must_use]
    pub fn with_bits(mut self, num_bits: u32) -> Self {
        self.num_bits = num_bits;
        self
    }

    /// Sets the learning rate.
    #[must_use]
    pub fn with_learning_rate(mut self, eta: f32) -> Self {
        self.eta = eta;
        self
    }

    /// Sets the number of passes.
    #[must_use]
    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    /// Enables adaptive per-feature learning rates.
    #[must_use]
    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Sets the loss function by name.
    #[must_use]
    pub fn with_loss(mut self, loss: &str) -> Self {
        self.loss = loss.to_string();
        self
    }

    /// Sets the link function by name.
    #[must_use]
    pub fn with_link(mut self, link: &str) -> Self {
        self.link = link.to_string();
        self
    }

    /// Declares a quadratic namespace cross.
    #[must_use]
    pub fn with_pair(mut self, pair: &str) -> Self {
        self.pairs.push(pair.to_string());
        self
    }

    /// Declares a cubic namespace cross.
    #[must_use]
    pub fn with_triple(mut self, triple: &str) -> Self {
        self.triples.push(triple.to_string());
        self
    }

    /// Enables the sigmoidal feedforward layer with `units` hidden units.
    #[must_use]
    pub fn with_nn(mut self, units: u32) -> Self {
        self.nn_units = units;
        self
    }

    /// Enables one-against-all with `classes` classes.
    #[must_use]
    pub fn with_oaa(mut self, classes: u32) -> Self {
        self.oaa_classes = classes;
        self
    }

    /// Sets the seed for every deterministic pseudo-random stream.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Stride shift implied by the enabled per-feature state.
    #[must_use]
    pub fn stride_shift(&self) -> u32 {
        u32::from(self.adaptive)
    }

    /// Checks the configuration for conflicts before training starts.
    ///
    /// # Errors
    ///
    /// Returns a fatal configuration error on any conflict; training must
    /// not begin when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.num_bits == 0 || self.num_bits > 31 {
            return Err(CaudalError::InvalidHyperparameter {
                param: "num_bits".to_string(),
                value: self.num_bits.to_string(),
                constraint: "1..=31".to_string(),
            });
        }
        if !self.skips.is_empty() && self.ngram.is_empty() {
            return Err(CaudalError::conflict(
                "you can not skip unless ngram is > 1",
            ));
        }
        for pair in &self.pairs {
            if pair.len() != 2 {
                return Err(CaudalError::conflict(
                    "quadratic crosses must name exactly two namespaces",
                ));
            }
        }
        for triple in &self.triples {
            if triple.len() != 3 {
                return Err(CaudalError::conflict(
                    "cubic crosses must name exactly three namespaces",
                ));
            }
        }
        match self.link.as_str() {
            "identity" | "logistic" | "glf1" => {}
            other => {
                return Err(CaudalError::InvalidHyperparameter {
                    param: "link".to_string(),
                    value: other.to_string(),
                    constraint: "one of identity, logistic, glf1".to_string(),
                });
            }
        }
        crate::loss::loss_by_name(&self.loss)?;
        if self.nn_dropout && self.nn_units == 0 {
            return Err(CaudalError::conflict("dropout requires hidden units"));
        }
        if self.oaa_classes == 1 {
            return Err(CaudalError::InvalidHyperparameter {
                param: "oaa_classes".to_string(),
                value: "1".to_string(),
                constraint: "0 (disabled) or >= 2".to_string(),
            });
        }
        if self.eta <= 0.0 {
            return Err(CaudalError::InvalidHyperparameter {
                param: "eta".to_string(),
                value: self.eta.to_string(),
                constraint: "> 0".to_string(),
            });
        }
        Ok(())
    }

    /// Declared pairs as namespace-byte arrays, for the feature iterator.
    #[must_use]
    pub fn pair_bytes(&self) -> Vec<[u8; 2]> {
        self.pairs
            .iter()
            .filter(|p| p.len() == 2)
            .map(|p| {
                let b = p.as_bytes();
                [b[0], b[1]]
            })
            .collect()
    }

    /// Declared triples as namespace-byte arrays, for the feature iterator.
    #[must_use]
    pub fn triple_bytes(&self) -> Vec<[u8; 3]> {
        self.triples
            .iter()
            .filter(|t| t.len() == 3)
            .map(|t| {
                let b = t.as_bytes();
                [b[0], b[1], b[2]]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(Config::new().validate().is_ok());
    }

    #[test]
    fn test_skips_without_ngram_is_fatal() {
        let mut cfg = Config::new();
        cfg.skips.push("a2".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("ngram"));

        cfg.ngram.push("a3".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_bits_out_of_range() {
        assert!(Config::new().with_bits(0).validate().is_err());
        assert!(Config::new().with_bits(32).validate().is_err());
        assert!(Config::new().with_bits(31).validate().is_ok());
    }

    #[test]
    fn test_malformed_cross_declarations() {
        assert!(Config::new().with_pair("abc").validate().is_err());
        assert!(Config::new().with_triple("ab").validate().is_err());
        assert!(Config::new().with_pair("ab").with_triple("abc").validate().is_ok());
    }

    #[test]
    fn test_unknown_link_and_loss() {
        assert!(Config::new().with_link("probit").validate().is_err());
        assert!(Config::new().with_loss("0-1").validate().is_err());
        assert!(Config::new().with_link("glf1").with_loss("hinge").validate().is_ok());
    }

    #[test]
    fn test_oaa_single_class_rejected() {
        assert!(Config::new().with_oaa(1).validate().is_err());
        assert!(Config::new().with_oaa(3).validate().is_ok());
    }

    #[test]
    fn test_stride_shift_follows_adaptive() {
        assert_eq!(Config::new().stride_shift(), 0);
        assert_eq!(Config::new().with_adaptive(true).stride_shift(), 1);
    }

    #[test]
    fn test_pair_bytes() {
        let cfg = Config::new().with_pair("ab").with_triple("xyz");
        assert_eq!(cfg.pair_bytes(), vec![[b'a', b'b']]);
        assert_eq!(cfg.triple_bytes(), vec![[b'x', b'y', b'z']]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let cfg = Config::new().with_bits(20).with_nn(8).with_seed(19);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.num_bits, 20);
        assert_eq!(back.nn_units, 8);
        assert_eq!(back.random_seed, 19);
    }
}
