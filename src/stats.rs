//! Running-loss accounting shared by the whole stack.
//!
//! One [`SharedStats`] instance tracks weighted example counts, summed loss,
//! and the observed label range. Layers that train hidden sub-problems
//! against synthetic targets freeze range tracking while they do so, then
//! restore it, so the outer task's label range is never polluted.

use std::io::Write;

/// How observed labels feed the tracked range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinMaxPolicy {
    /// Widen the range with every labeled example.
    #[default]
    Track,
    /// Ignore observations; used around synthetic sub-calls.
    Frozen,
}

/// Shared accounting for progress reporting and prediction clamping.
#[derive(Debug, Clone)]
pub struct SharedStats {
    /// Examples processed so far.
    pub example_number: u64,
    /// Total feature count across processed examples.
    pub total_features: u64,
    /// Sum of importance weights of labeled examples.
    pub weighted_examples: f64,
    /// Sum of weighted labels.
    pub weighted_labels: f64,
    /// Total loss so far.
    pub sum_loss: f64,
    /// Loss accumulated since the last progress row.
    pub sum_loss_since_last_dump: f64,
    /// Weighted examples at the last progress row.
    pub old_weighted_examples: f64,
    /// Weighted-example threshold triggering the next progress row.
    pub dump_interval: f32,
    /// Minimum label observed.
    pub min_label: f32,
    /// Maximum label observed.
    pub max_label: f32,
    /// Range-tracking mode.
    pub minmax: MinMaxPolicy,
}

impl Default for SharedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStats {
    /// Fresh accounting state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            example_number: 0,
            total_features: 0,
            weighted_examples: 0.0,
            weighted_labels: 0.0,
            sum_loss: 0.0,
            sum_loss_since_last_dump: 0.0,
            old_weighted_examples: 0.0,
            dump_interval: 1.0,
            min_label: 0.0,
            max_label: 0.0,
            minmax: MinMaxPolicy::Track,
        }
    }

    /// Widens the observed label range, unless tracking is frozen.
    pub fn set_minmax(&mut self, label: f32) {
        if self.minmax == MinMaxPolicy::Frozen || label == f32::MAX {
            return;
        }
        if label < self.min_label {
            self.min_label = label;
        }
        if label > self.max_label {
            self.max_label = label;
        }
    }

    /// Folds one finished example into the running totals.
    /// `weighted_label` is the example's label times its importance
    /// weight, zero when unlabeled.
    pub fn update(&mut self, loss: f64, weighted_label: f64, weight: f64, num_features: usize) {
        self.weighted_examples += weight;
        self.weighted_labels += weighted_label;
        self.sum_loss += loss;
        self.sum_loss_since_last_dump += loss;
        self.total_features += num_features as u64;
        self.example_number += 1;
    }

    /// Average loss over everything seen so far.
    #[must_use]
    pub fn average_loss(&self) -> f64 {
        if self.weighted_examples > 0.0 {
            self.sum_loss / self.weighted_examples
        } else {
            0.0
        }
    }

    /// Resets the since-last-dump accumulators and advances the dump
    /// threshold, additively or multiplicatively.
    pub fn update_dump_interval(&mut self, progress_add: bool, progress_arg: f32) {
        self.sum_loss_since_last_dump = 0.0;
        self.old_weighted_examples = self.weighted_examples;
        if progress_add {
            self.dump_interval = self.weighted_examples as f32 + progress_arg;
        } else {
            self.dump_interval = self.weighted_examples as f32 * progress_arg;
        }
    }

    /// Writes the progress-table header.
    pub fn print_header(out: &mut dyn Write) {
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:>12} {:>14} {:>8} {:>8} {:>8}",
            "average", "since", "example", "example", "current", "current", "current"
        );
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:>12} {:>14} {:>8} {:>8} {:>8}",
            "loss", "last", "counter", "weight", "label", "predict", "features"
        );
    }

    /// Writes one progress row and advances the dump threshold.
    pub fn print_update(
        &mut self,
        out: &mut dyn Write,
        label: &str,
        prediction: &str,
        num_features: usize,
        progress_add: bool,
        progress_arg: f32,
    ) {
        let since_last = if self.weighted_examples > self.old_weighted_examples {
            self.sum_loss_since_last_dump / (self.weighted_examples - self.old_weighted_examples)
        } else {
            0.0
        };
        let _ = writeln!(
            out,
            "{:<10.6} {:<10.6} {:>12} {:>14.1} {:>8} {:>8} {:>8}",
            self.average_loss(),
            since_last,
            self.example_number,
            self.weighted_examples,
            label,
            prediction,
            num_features
        );
        self.update_dump_interval(progress_add, progress_arg);
    }
}
