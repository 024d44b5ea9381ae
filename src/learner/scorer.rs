//! Loss accounting and link application above the base learner.
//!
//! The scorer wraps the base algorithm directly: it widens the observed
//! label range before delegating, charges the example its loss once a
//! prediction exists, and maps the raw score through the configured link
//! function. Layers above the scorer therefore see linked predictions and
//! per-example losses without computing either themselves.

use crate::config::Config;
use crate::error::{CaudalError, Result};
use crate::example::{Example, Prediction};
use crate::learner::Learner;
use crate::model::ModelIo;
use crate::workspace::Workspace;

/// Output mapping applied to the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Raw score, unchanged.
    Identity,
    /// Sigmoid into (0, 1).
    Logistic,
    /// Generalized logistic into (-1, 1).
    Glf1,
}

impl Link {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "identity" => Ok(Link::Identity),
            "logistic" => Ok(Link::Logistic),
            "glf1" => Ok(Link::Glf1),
            other => Err(CaudalError::InvalidHyperparameter {
                param: "link".to_string(),
                value: other.to_string(),
                constraint: "one of identity, logistic, glf1".to_string(),
            }),
        }
    }

    /// Applies the link to a raw score.
    #[must_use]
    pub fn apply(self, raw: f32) -> f32 {
        match self {
            Link::Identity => raw,
            Link::Logistic => 1.0 / (1.0 + (-raw).exp()),
            Link::Glf1 => 2.0 / (1.0 + (-raw).exp()) - 1.0,
        }
    }
}

/// The scoring layer.
pub struct Scorer {
    base: Box<dyn Learner>,
    link: Link,
    increment: u32,
}

impl Scorer {
    /// Wraps `base` with loss accounting and the configured link.
    ///
    /// # Errors
    ///
    /// Fails on an unknown link name.
    pub fn setup(config: &Config, base: Box<dyn Learner>) -> Result<Box<dyn Learner>> {
        let link = Link::parse(&config.link)?;
        let increment = base.increment();
        Ok(Box::new(Self {
            base,
            link,
            increment,
        }))
    }

    fn account_loss(&self, ws: &mut Workspace, ec: &mut Example) {
        let ld = ec.label.simple();
        if ld.is_labeled() && ld.weight > 0.0 {
            ec.loss = ws.loss.loss(ec.pred.scalar(), ld.label) * ld.weight;
        }
        ec.pred = Prediction::Scalar(self.link.apply(ec.pred.scalar()));
    }
}

impl Learner for Scorer {
    fn increment(&self) -> u32 {
        self.increment
    }

    fn name(&self) -> &'static str {
        "scorer"
    }

    fn describe(&self) -> String {
        format!("{} [{}]", self.name(), self.base.describe())
    }

    fn predict_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        ws.sd.set_minmax(ec.label.simple().label);
        self.base.predict(ws, ec, 0);
        self.account_loss(ws, ec);
    }

    fn learn_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        let ld = ec.label.simple();
        ws.sd.set_minmax(ld.label);
        if ws.training && ld.is_labeled() && ld.weight > 0.0 {
            self.base.learn(ws, ec, 0);
        } else {
            self.base.predict(ws, ec, 0);
        }
        self.account_loss(ws, ec);
    }

    fn update_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        ws.sd.set_minmax(ec.label.simple().label);
        self.base.update(ws, ec, 0);
    }

    fn multipredict_inner(
        &mut self,
        ws: &mut Workspace,
        ec: &mut Example,
        count: usize,
        preds: &mut [f32],
        finalize: bool,
    ) {
        self.base.multipredict(ws, ec, 0, count, preds, finalize);
        for pred in preds.iter_mut().take(count) {
            *pred = self.link.apply(*pred);
        }
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
