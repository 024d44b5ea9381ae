//! Sigmoidal feedforward layer with one hidden layer of `k` units.
//!
//! Hidden units and the output unit are ordinary scalar sub-problems of
//! the wrapped learner, partitioned into `k + 1` address slots: units at
//! slots `0..k`, the output at slot `k`. The output unit's inputs are
//! synthetic features whose values are the tanh-squashed hidden
//! activations, addressed from a reserved constant so they never collide
//! with parser-produced indices.
//!
//! Hidden sub-problems always train under squared loss with activations
//! clamped to a fixed range; the caller's loss function and label range
//! are restored before control returns. Zero hidden-bias and zero
//! output-weight predictions are perturbed with small seeded random
//! targets, otherwise identical units would receive identical gradients
//! forever.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::error::Result;
use crate::example::{Example, Feature, Label, Prediction, SimpleLabel, NN_OUTPUT_NAMESPACE};
use crate::learner::gd::finalize_prediction;
use crate::learner::Learner;
use crate::loss::SquaredLoss;
use crate::model::ModelIo;
use crate::stats::MinMaxPolicy;
use crate::workspace::Workspace;

/// Base raw index of the synthetic hidden-output features.
pub const NN_CONSTANT: u32 = 533_357_803;

/// Clamp range for hidden activations before the tanh squash.
const HIDDEN_MIN_ACTIVATION: f32 = -3.0;
const HIDDEN_MAX_ACTIVATION: f32 = 3.0;

/// The feedforward layer.
pub struct Nn {
    k: u32,
    base: Box<dyn Learner>,
    increment: u32,
    base_increment: u32,
    output_layer: Example,
    hiddenbias: Example,
    outputweight: Example,
    dropout: bool,
    inpass: bool,
    multitask: bool,
    rng: StdRng,
    seed: u64,
    hidden_units: Vec<f32>,
    dropped_out: Vec<bool>,
    hiddenbias_pred: Vec<f32>,
    finished_setup: bool,
}

impl Nn {
    /// Wraps `base` with a hidden layer when units are configured;
    /// otherwise returns the base unchanged.
    #[must_use]
    pub fn setup(config: &Config, base: Box<dyn Learner>) -> Box<dyn Learner> {
        let k = config.nn_units;
        if k == 0 {
            return base;
        }
        let base_increment = base.increment();
        let increment = base_increment.wrapping_mul(k + 1);
        Box::new(Self {
            k,
            base,
            increment,
            base_increment,
            output_layer: Example::new(),
            hiddenbias: Example::new(),
            outputweight: Example::new(),
            dropout: config.nn_dropout,
            inpass: config.nn_inpass,
            multitask: config.nn_multitask,
            rng: StdRng::seed_from_u64(config.random_seed),
            seed: config.random_seed,
            hidden_units: vec![0.0; k as usize],
            dropped_out: vec![false; k as usize],
            hiddenbias_pred: vec![0.0; k as usize],
            finished_setup: false,
        })
    }

    /// Builds the fixed synthetic examples on first use. The output
    /// feature for unit `i` sits `i` base increments above the reserved
    /// constant, mirroring the slot partition of the hidden units.
    fn finish_setup(&mut self) {
        for i in 0..self.k {
            let index = NN_CONSTANT.wrapping_add(i.wrapping_mul(self.base_increment));
            self.output_layer
                .push_feature(NN_OUTPUT_NAMESPACE, Feature::new(1.0, index));
        }
        if !self.inpass {
            self.output_layer.push_feature(
                NN_OUTPUT_NAMESPACE,
                Feature::new(1.0, crate::example::CONSTANT_HASH),
            );
        }
        self.hiddenbias.push_constant();
        let first_output = self.output_layer.namespace(NN_OUTPUT_NAMESPACE)[0].index;
        self.outputweight
            .push_feature(NN_OUTPUT_NAMESPACE, Feature::new(1.0, first_output));
        self.finished_setup = true;
    }

    /// Runs `f` with squared loss, the hidden activation clamp range, and
    /// frozen range tracking, restoring all three afterwards.
    fn with_hidden_bounds<R>(ws: &mut Workspace, f: impl FnOnce(&mut Workspace) -> R) -> R {
        let saved_loss = std::mem::replace(&mut ws.loss, Box::new(SquaredLoss));
        let saved_min = ws.sd.min_label;
        let saved_max = ws.sd.max_label;
        let saved_policy = ws.sd.minmax;
        ws.sd.min_label = HIDDEN_MIN_ACTIVATION;
        ws.sd.max_label = HIDDEN_MAX_ACTIVATION;
        ws.sd.minmax = MinMaxPolicy::Frozen;
        let result = f(&mut *ws);
        ws.loss = saved_loss;
        ws.sd.min_label = saved_min;
        ws.sd.max_label = saved_max;
        ws.sd.minmax = saved_policy;
        result
    }

    fn set_output_values(&mut self, dropscale: f32) {
        let ns = NN_OUTPUT_NAMESPACE as usize;
        for i in 0..self.k as usize {
            let value = if self.dropped_out[i] {
                0.0
            } else {
                dropscale * self.hidden_units[i].tanh()
            };
            self.output_layer.atomics[ns][i].value = value;
        }
        let sq: f32 = self.output_layer.atomics[ns]
            .iter()
            .map(|f| f.value * f.value)
            .sum();
        let old = self.output_layer.sum_feat_sq[ns];
        self.output_layer.sum_feat_sq[ns] = sq;
        self.output_layer.total_sum_feat_sq += sq - old;
    }

    /// Splices the synthetic output features into the caller's example so
    /// the output unit also sees the raw inputs (skip-layer connections).
    fn append_outputs(&mut self, ec: &mut Example) {
        let ns = NN_OUTPUT_NAMESPACE as usize;
        ec.indices.push(NN_OUTPUT_NAMESPACE);
        for i in 0..self.k as usize {
            ec.atomics[ns].push(self.output_layer.atomics[ns][i]);
        }
        ec.sum_feat_sq[ns] = self.output_layer.sum_feat_sq[ns];
        ec.total_sum_feat_sq += self.output_layer.sum_feat_sq[ns];
        ec.num_features += self.k as usize;
    }

    fn remove_outputs(&mut self, ec: &mut Example) {
        let ns = NN_OUTPUT_NAMESPACE as usize;
        ec.atomics[ns].clear();
        ec.indices.pop();
        ec.total_sum_feat_sq -= ec.sum_feat_sq[ns];
        ec.sum_feat_sq[ns] = 0.0;
        ec.num_features -= self.k as usize;
    }

    /// Computes the hidden activations at the current offset, perturbing
    /// any exactly-zero hidden bias to break unit symmetry.
    fn hidden_forward(&mut self, ws: &mut Workspace, ec: &mut Example) {
        Self::with_hidden_bounds(ws, |ws| {
            self.hiddenbias.ft_offset = ec.ft_offset;
            self.hiddenbias.label = Label::Simple(SimpleLabel::unlabeled());
            self.base.multipredict(
                ws,
                &mut self.hiddenbias,
                0,
                self.k as usize,
                &mut self.hiddenbias_pred,
                true,
            );
            for i in 0..self.k as usize {
                if self.hiddenbias_pred[i] == 0.0 {
                    let target = self.rng.gen::<f32>() - 0.5;
                    self.hiddenbias.label = Label::Simple(SimpleLabel::new(target));
                    self.base.learn(ws, &mut self.hiddenbias, i as u32);
                    self.hiddenbias.label = Label::Simple(SimpleLabel::unlabeled());
                }
            }
            self.base.multipredict(
                ws,
                ec,
                0,
                self.k as usize,
                &mut self.hidden_units,
                true,
            );
        });
    }

    /// Reads the output weight feeding unit `i`'s activation into the
    /// output unit, perturbing it away from an exact zero. The probe runs
    /// at the caller's offset so each slot sees its own output weights.
    fn output_weight(&mut self, ws: &mut Workspace, i: usize, offset: u32) -> f32 {
        let ns = NN_OUTPUT_NAMESPACE as usize;
        self.outputweight.atomics[ns][0].index = self.output_layer.atomics[ns][i].index;
        self.outputweight.ft_offset = offset;
        self.outputweight.label = Label::Simple(SimpleLabel::unlabeled());
        self.base.predict(ws, &mut self.outputweight, self.k);
        let mut nu = self.outputweight.pred.scalar();
        if nu == 0.0 {
            let target = (self.rng.gen::<f32>() - 0.5) / (self.k as f32).sqrt();
            self.outputweight.label = Label::Simple(SimpleLabel::new(target));
            self.base.learn(ws, &mut self.outputweight, self.k);
            self.outputweight.label = Label::Simple(SimpleLabel::unlabeled());
            self.base.predict(ws, &mut self.outputweight, self.k);
            nu = self.outputweight.pred.scalar();
        }
        nu
    }

    /// Pushes the output gradient back through each live unit: the unit
    /// relearns toward its own activation minus the backpropagated step.
    fn hidden_backward(
        &mut self,
        ws: &mut Workspace,
        ec: &mut Example,
        gradient: f32,
        dropscale: f32,
        output_offset: u32,
    ) {
        let save_label = ec.label.clone();
        Self::with_hidden_bounds(ws, |ws| {
            for i in 0..self.k as usize {
                if self.dropped_out[i] {
                    continue;
                }
                let ns = NN_OUTPUT_NAMESPACE as usize;
                let sigmah = self.output_layer.atomics[ns][i].value / dropscale;
                let sigmahprime = dropscale * (1.0 - sigmah * sigmah);
                let nu = self.output_weight(ws, i, output_offset);
                let gradhw = 0.5 * nu * gradient * sigmahprime;
                let target = finalize_prediction(&ws.sd, self.hidden_units[i] - gradhw);
                if target != self.hidden_units[i] {
                    ec.label = Label::Simple(SimpleLabel::new(target));
                    self.base.learn(ws, ec, i as u32);
                }
            }
        });
        ec.label = save_label;
    }

    fn predict_or_learn(&mut self, ws: &mut Workspace, ec: &mut Example, is_learn: bool) {
        if !self.finished_setup {
            self.finish_setup();
        }
        let ld = ec.label.simple();
        let save_label = ec.label.clone();
        let save_offset = ec.ft_offset;
        // Shared hidden layer: every wrapping task's sub-problems reuse
        // the slot-0 hidden weights.
        if self.multitask {
            ec.ft_offset = 0;
        }

        self.hidden_forward(ws, ec);

        let learning = is_learn && ws.training && ld.is_labeled() && ld.weight > 0.0;
        if learning && self.dropout {
            for i in 0..self.dropped_out.len() {
                self.dropped_out[i] = self.rng.gen::<f32>() < 0.5;
            }
        }

        let variants = if self.dropout { 2 } else { 1 };
        let dropscale = if self.dropout { 2.0 } else { 1.0 };
        let mut sum_pred = 0.0f32;
        let mut sum_partial = 0.0f32;
        let mut sum_loss = 0.0f32;

        for variant in 0..variants {
            if variant == 1 {
                for dropped in &mut self.dropped_out {
                    *dropped = !*dropped;
                }
            }
            self.set_output_values(dropscale);

            // Forward at the output slot, at the caller's real offset.
            ec.ft_offset = save_offset;
            ec.label = Label::Simple(ld);
            let (prediction, partial, loss) = if self.inpass {
                ec.loss = 0.0;
                self.append_outputs(ec);
                self.base.predict(ws, ec, self.k);
                let out = (ec.pred.scalar(), ec.partial_prediction, ec.loss);
                self.remove_outputs(ec);
                out
            } else {
                self.output_layer.ft_offset = save_offset;
                self.output_layer.label = Label::Simple(ld);
                self.output_layer.loss = 0.0;
                self.base.predict(ws, &mut self.output_layer, self.k);
                (
                    self.output_layer.pred.scalar(),
                    self.output_layer.partial_prediction,
                    self.output_layer.loss,
                )
            };

            if learning {
                let gradient = ws.loss.first_derivative(prediction, ld.label);
                if gradient.abs() > 0.0 {
                    if self.multitask {
                        ec.ft_offset = 0;
                    }
                    // Hidden phases may run at offset 0, but the output
                    // weights always live at the caller's real offset.
                    self.hidden_backward(ws, ec, gradient, dropscale, save_offset);
                    ec.ft_offset = save_offset;
                    ec.label = Label::Simple(ld);
                    if self.inpass {
                        self.append_outputs(ec);
                        self.base.learn(ws, ec, self.k);
                        self.remove_outputs(ec);
                    } else {
                        self.base.learn(ws, &mut self.output_layer, self.k);
                    }
                }
            }

            sum_pred += prediction;
            sum_partial += partial;
            sum_loss += loss;
        }

        let scale = 1.0 / variants as f32;
        ec.ft_offset = save_offset;
        ec.label = save_label;
        ec.partial_prediction = sum_partial * scale;
        ec.pred = Prediction::Scalar(sum_pred * scale);
        ec.loss = sum_loss * scale;
    }
}

impl Learner for Nn {
    fn increment(&self) -> u32 {
        self.increment
    }

    fn name(&self) -> &'static str {
        "nn"
    }

    fn describe(&self) -> String {
        format!("{} [{}]", self.name(), self.base.describe())
    }

    fn predict_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        self.predict_or_learn(ws, ec, false);
    }

    fn learn_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        self.predict_or_learn(ws, ec, true);
    }

    fn save_load(&mut self, ws: &mut Workspace, io: &mut ModelIo) -> Result<()> {
        self.base.save_load(ws, io)
    }

    /// Reseeds the perturbation stream so every pass sees the same
    /// sequence of healing targets and dropout masks.
    fn end_pass(&mut self, ws: &mut Workspace) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.base.end_pass(ws);
    }

    fn finish_example(&mut self, ws: &mut Workspace, ec: &mut Example) {
        self.base.finish_example(ws, ec);
    }

    fn finish(&mut self, ws: &mut Workspace) {
        self.base.finish(ws);
    }
}
