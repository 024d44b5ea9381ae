//! Stochastic gradient descent over the shared weight table.
//!
//! This is the terminal layer of every stack: it owns no base, consumes
//! exactly one logical address per sub-problem, and is the only layer that
//! writes persisted weights. Prediction and update both walk the example
//! through the same feature iterator, so the set of touched addresses is
//! identical in both directions.

use crate::config::Config;
use crate::error::Result;
use crate::example::{Example, Prediction};
use crate::features::{foreach_feature, inline_predict};
use crate::learner::Learner;
use crate::model::ModelIo;
use crate::stats::SharedStats;
use crate::workspace::Workspace;

/// Turns a raw accumulated dot product into a reportable prediction:
/// non-finite values collapse to 0 and everything is clamped to the
/// observed label range.
#[must_use]
pub fn finalize_prediction(sd: &SharedStats, raw: f32) -> f32 {
    if !raw.is_finite() {
        return 0.0;
    }
    if raw > sd.max_label {
        sd.max_label
    } else if raw < sd.min_label {
        sd.min_label
    } else {
        raw
    }
}

/// The base gradient-descent learner.
pub struct Gd {
    increment: u32,
}

impl Gd {
    /// Builds the base learner. One logical address per sub-problem.
    #[must_use]
    pub fn setup(config: &Config) -> Self {
        let _ = config;
        Self { increment: 1 }
    }

    fn update_weights(ws: &mut Workspace, ec: &Example, gradient: f32, eta_t: f32) {
        let Workspace {
            weights,
            interactions,
            adaptive,
            ..
        } = ws;
        let mask = weights.mask();
        if *adaptive {
            let g2 = gradient * gradient;
            foreach_feature(interactions, ec, &mut |x, index| {
                let entry = weights.entry_mut(index & mask);
                entry[1] += g2 * x * x;
                if entry[1] > 0.0 {
                    entry[0] -= eta_t * gradient * x / entry[1].sqrt();
                }
            });
        } else {
            foreach_feature(interactions, ec, &mut |x, index| {
                weights.apply_update(index & mask, -eta_t * gradient * x);
            });
        }
    }
}

impl Learner for Gd {
    fn increment(&self) -> u32 {
        self.increment
    }

    fn name(&self) -> &'static str {
        "gd"
    }

    fn predict_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        let sum = inline_predict(&ws.weights, &ws.interactions, ec);
        ec.partial_prediction = sum;
        ec.pred = Prediction::Scalar(finalize_prediction(&ws.sd, sum));
    }

    fn learn_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        self.predict_inner(ws, ec);
        let ld = ec.label.simple();
        if ws.training && ld.is_labeled() && ld.weight > 0.0 {
            self.update_inner(ws, ec);
        }
    }

    fn update_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        let ld = ec.label.simple();
        if !ws.training || !ld.is_labeled() || ld.weight <= 0.0 {
            return;
        }
        ws.t += f64::from(ld.weight);
        let gradient = ws.loss.first_derivative(ec.pred.scalar(), ld.label) * ld.weight;
        if gradient == 0.0 {
            return;
        }
        // Power-law rate schedule over the cumulative importance weight.
        let t = ws.t as f32;
        let eta_t = ws.eta * t.powf(-ws.power_t);
        Self::update_weights(ws, ec, gradient, eta_t);
    }

    /// Single feature traversal filling all slots at once: for each
    /// produced (value, index) pair the consecutive slot addresses are one
    /// increment apart, so the per-slot sums accumulate in lockstep. When
    /// the whole slot span fits under the mask the per-slot masking is
    /// skipped; otherwise each slot address wraps individually.
    fn multipredict_inner(
        &mut self,
        ws: &mut Workspace,
        ec: &mut Example,
        count: usize,
        preds: &mut [f32],
        finalize: bool,
    ) {
        let initial = ec.label.simple().initial;
        for pred in preds.iter_mut().take(count) {
            *pred = initial;
        }
        let step = self.increment;
        let span = u64::from(step) * count.saturating_sub(1) as u64;
        let weights = &ws.weights;
        let mask = weights.mask();
        foreach_feature(&ws.interactions, ec, &mut |x, index| {
            if x.abs() < 1e-10 {
                return;
            }
            let fi = weights.resolve(index, 0);
            if u64::from(fi) + span <= u64::from(mask) {
                for (c, pred) in preds.iter_mut().take(count).enumerate() {
                    *pred += weights.accumulate(fi + step * c as u32, x);
                }
            } else {
                for (c, pred) in preds.iter_mut().take(count).enumerate() {
                    let address = weights.resolve(fi, step.wrapping_mul(c as u32));
                    *pred += weights.accumulate(address, x);
                }
            }
        });
        if finalize {
            for pred in preds.iter_mut().take(count) {
                *pred = finalize_prediction(&ws.sd, *pred);
            }
        }
    }

    /// Persists the sparse primary weights. Auxiliary per-feature slots
    /// (adaptive-rate accumulators) are training state, not model state,
    /// and start fresh after a reload.
    fn save_load(&mut self, ws: &mut Workspace, io: &mut ModelIo) -> Result<()> {
        if io.is_read() {
            let mut count = 0u64;
            io.u64_field(&mut count)?;
            let mask = ws.weights.mask();
            for _ in 0..count {
                let mut index = 0u32;
                let mut value = 0f32;
                io.u32_field(&mut index)?;
                io.f32_field(&mut value)?;
                *ws.weights.weight_mut(index & mask) = value;
            }
        } else {
            let pairs: Vec<(u32, f32)> = ws.weights.nonzero().collect();
            let mut count = pairs.len() as u64;
            io.u64_field(&mut count)?;
            for (index, value) in pairs {
                let (mut i, mut v) = (index, value);
                io.u32_field(&mut i)?;
                io.f32_field(&mut v)?;
            }
        }
        Ok(())
    }

    fn end_pass(&mut self, ws: &mut Workspace) {
        ws.eta *= ws.eta_decay_rate;
    }
}
