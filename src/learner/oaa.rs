//! One-against-all multiclass over a scalar base learner.
//!
//! Each of the `k` classes trains an independent binary sub-problem in its
//! own address slot. Prediction batches all `k` scores through one
//! multipredict call and takes the argmax; learning relabels the same
//! physical example once per class with a +1/-1 target. Optionally only a
//! random subset of the negative classes is updated per example.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::Config;
use crate::error::Result;
use crate::example::{Example, Label, Prediction, SimpleLabel};
use crate::learner::Learner;
use crate::model::ModelIo;
use crate::workspace::Workspace;

/// The one-against-all layer.
pub struct Oaa {
    k: u32,
    base: Box<dyn Learner>,
    increment: u32,
    preds: Vec<f32>,
    num_subsample: u32,
    subsample_order: Vec<u32>,
    subsample_id: usize,
}

impl Oaa {
    /// Wraps `base` with one-against-all when classes are configured;
    /// otherwise returns the base unchanged.
    #[must_use]
    pub fn setup(config: &Config, base: Box<dyn Learner>) -> Box<dyn Learner> {
        let k = config.oaa_classes;
        if k == 0 {
            return base;
        }
        let mut num_subsample = config.oaa_subsample;
        if num_subsample >= k {
            eprintln!(
                "warning: oaa subsample {num_subsample} >= {k} classes, turning off subsampling"
            );
            num_subsample = 0;
        }
        let mut subsample_order = Vec::new();
        if num_subsample > 0 {
            subsample_order = (0..k).collect();
            let mut rng = StdRng::seed_from_u64(config.random_seed);
            subsample_order.shuffle(&mut rng);
        }
        let increment = base.increment().wrapping_mul(k);
        Box::new(Self {
            k,
            base,
            increment,
            preds: vec![0.0; k as usize],
            num_subsample,
            subsample_order,
            subsample_id: 0,
        })
    }

    fn multiclass_label(&self, ec: &Example) -> (u32, f32) {
        match ec.label {
            Label::Multiclass { class, weight } => {
                if class > self.k {
                    eprintln!(
                        "warning: label {class} is not in {{1,{}}} This won't work right.",
                        self.k
                    );
                }
                (class, weight)
            }
            _ => (0, 1.0),
        }
    }

    /// Batches all class scores and returns the 1-based argmax, ties to
    /// the lowest class.
    fn score_all(&mut self, ws: &mut Workspace, ec: &mut Example) -> u32 {
        ec.label = Label::Simple(SimpleLabel::unlabeled());
        let count = self.k as usize;
        let Self { base, preds, .. } = self;
        base.multipredict(ws, ec, 0, count, preds, true);
        let mut best = 0usize;
        for (i, &score) in self.preds.iter().enumerate() {
            if score > self.preds[best] {
                best = i;
            }
        }
        best as u32 + 1
    }

    fn learn_all(&mut self, ws: &mut Workspace, ec: &mut Example, class: u32, weight: f32) {
        for i in 1..=self.k {
            let target = if i == class { 1.0 } else { -1.0 };
            ec.label = Label::Simple(SimpleLabel {
                label: target,
                weight,
                initial: 0.0,
            });
            ec.pred = Prediction::Scalar(self.preds[(i - 1) as usize]);
            self.base.update(ws, ec, i - 1);
        }
    }

    /// Learns the true class plus `num_subsample` random negatives,
    /// advancing through a fixed seeded permutation so repeated examples
    /// cover different negatives.
    fn learn_subsampled(&mut self, ws: &mut Workspace, ec: &mut Example, class: u32, weight: f32) {
        ec.label = Label::Simple(SimpleLabel {
            label: 1.0,
            weight,
            initial: 0.0,
        });
        self.base.learn(ws, ec, class - 1);
        let mut done = 0;
        let mut p = self.subsample_id;
        while done < self.num_subsample {
            let candidate = self.subsample_order[p];
            p = (p + 1) % self.subsample_order.len();
            if candidate != class - 1 {
                ec.label = Label::Simple(SimpleLabel {
                    label: -1.0,
                    weight,
                    initial: 0.0,
                });
                self.base.learn(ws, ec, candidate);
                done += 1;
            }
        }
        self.subsample_id = p;
    }

    /// Zero-one loss, scaled by the importance weight. Unlabeled examples
    /// are not charged.
    fn multiclass_loss(class: u32, prediction: u32, weight: f32) -> f32 {
        if class > 0 && class != prediction {
            weight
        } else {
            0.0
        }
    }
}

impl Learner for Oaa {
    fn increment(&self) -> u32 {
        self.increment
    }

    fn name(&self) -> &'static str {
        "oaa"
    }

    fn describe(&self) -> String {
        format!("{} [{}]", self.name(), self.base.describe())
    }

    fn predict_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        let (class, weight) = self.multiclass_label(ec);
        let prediction = self.score_all(ws, ec);
        ec.label = Label::Multiclass { class, weight };
        ec.pred = Prediction::Multiclass(prediction);
        ec.loss = Self::multiclass_loss(class, prediction, weight);
    }

    fn learn_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        let (class, weight) = self.multiclass_label(ec);
        let prediction = self.score_all(ws, ec);
        if ws.training && class > 0 && weight > 0.0 {
            if self.num_subsample > 0 && class <= self.k {
                self.learn_subsampled(ws, ec, class, weight);
            } else {
                self.learn_all(ws, ec, class, weight);
            }
        }
        ec.label = Label::Multiclass { class, weight };
        ec.pred = Prediction::Multiclass(prediction);
        ec.loss = Self::multiclass_loss(class, prediction, weight);
    }

    fn save_load(&mut self, ws: &mut Workspace, io: &mut ModelIo) -> Result<()> {
        self.base.save_load(ws, io)
    }

    fn end_pass(&mut self, ws: &mut Workspace) {
        self.base.end_pass(ws);
    }

    fn finish_example(&mut self, ws: &mut Workspace, ec: &mut Example) {
        self.base.finish_example(ws, ec);
    }

    fn finish(&mut self, ws: &mut Workspace) {
        self.base.finish(ws);
    }
}
