//! The learner composition stack.
//!
//! A stack is an ordered chain of layers, each owning private state and
//! (except the terminal base algorithm) wrapping the next layer down. All
//! layers share one weight table and the uniform operation contract:
//! predict, learn, update, multipredict, plus the save/finish/pass
//! lifecycle hooks. Capabilities a layer does not override default to a
//! delegation to its base, or to a no-op at the terminal algorithm.
//!
//! Construction is two-phase: layers are instantiated bottom-up, each
//! recording the address-space increment it and everything it wraps
//! consume per logical sub-problem; the total partition is final only once
//! the whole chain exists. Increments are read-only thereafter.

pub mod gd;
pub mod nn;
pub mod oaa;
pub mod scorer;

pub use gd::Gd;
pub use nn::Nn;
pub use oaa::Oaa;
pub use scorer::Scorer;

use crate::config::Config;
use crate::error::Result;
use crate::example::Example;
use crate::model::ModelIo;
use crate::workspace::Workspace;

/// One layer of the learner stack.
///
/// The slot-taking entry points (`predict`, `learn`, `update`,
/// `multipredict`) shift the example's `ft_offset` by `slot * increment`
/// (wrapping u32 arithmetic, matching the address masking downstream)
/// around the overridable `*_inner` body, and restore it on return. A
/// layer overriding an `_inner` method that temporarily mutates the
/// example must restore every mutated field on every exit path.
pub trait Learner {
    /// Weight slots this layer and everything it wraps consume per
    /// logical sub-problem. Fixed at construction.
    fn increment(&self) -> u32;

    /// Short layer name, used in the model's stack descriptor.
    fn name(&self) -> &'static str;

    /// Full chain descriptor, outermost first.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Prediction body at the current offset. Writes only the example's
    /// prediction fields, never persisted weights.
    fn predict_inner(&mut self, ws: &mut Workspace, ec: &mut Example);

    /// Learning body at the current offset. May mutate the weight table;
    /// calling it twice applies two independent updates.
    fn learn_inner(&mut self, ws: &mut Workspace, ec: &mut Example);

    /// Applies a weight change from an already-computed prediction,
    /// without recomputing it. Defaults to a full learn.
    fn update_inner(&mut self, ws: &mut Workspace, ec: &mut Example) {
        self.learn_inner(ws, ec);
    }

    /// Computes `count` predictions for consecutive slots starting at the
    /// current offset. The default steps the offset by `increment` between
    /// single predictions; overrides must produce identical results.
    fn multipredict_inner(
        &mut self,
        ws: &mut Workspace,
        ec: &mut Example,
        count: usize,
        preds: &mut [f32],
        finalize: bool,
    ) {
        let _ = finalize;
        let step = self.increment();
        for pred in preds.iter_mut().take(count) {
            self.predict_inner(ws, ec);
            *pred = ec.pred.scalar();
            ec.ft_offset = ec.ft_offset.wrapping_add(step);
        }
        ec.ft_offset = ec.ft_offset.wrapping_sub(step.wrapping_mul(count as u32));
    }

    /// Predicts for one sub-problem slot.
    fn predict(&mut self, ws: &mut Workspace, ec: &mut Example, slot: u32) {
        let shift = self.increment().wrapping_mul(slot);
        ec.ft_offset = ec.ft_offset.wrapping_add(shift);
        self.predict_inner(ws, ec);
        ec.ft_offset = ec.ft_offset.wrapping_sub(shift);
    }

    /// Learns for one sub-problem slot.
    fn learn(&mut self, ws: &mut Workspace, ec: &mut Example, slot: u32) {
        let shift = self.increment().wrapping_mul(slot);
        ec.ft_offset = ec.ft_offset.wrapping_add(shift);
        self.learn_inner(ws, ec);
        ec.ft_offset = ec.ft_offset.wrapping_sub(shift);
    }

    /// Updates for one sub-problem slot.
    fn update(&mut self, ws: &mut Workspace, ec: &mut Example, slot: u32) {
        let shift = self.increment().wrapping_mul(slot);
        ec.ft_offset = ec.ft_offset.wrapping_add(shift);
        self.update_inner(ws, ec);
        ec.ft_offset = ec.ft_offset.wrapping_sub(shift);
    }

    /// Batched prediction for slots `lo_slot..lo_slot + count`, equivalent
    /// to that many single `predict` calls on an otherwise-unmodified
    /// example.
    fn multipredict(
        &mut self,
        ws: &mut Workspace,
        ec: &mut Example,
        lo_slot: u32,
        count: usize,
        preds: &mut [f32],
        finalize: bool,
    ) {
        let shift = self.increment().wrapping_mul(lo_slot);
        ec.ft_offset = ec.ft_offset.wrapping_add(shift);
        self.multipredict_inner(ws, ec, count, preds, finalize);
        ec.ft_offset = ec.ft_offset.wrapping_sub(shift);
    }

    /// Serializes this layer's state, then its base's, in stack order.
    /// On reload the stack must be reconstructed identically.
    fn save_load(&mut self, ws: &mut Workspace, io: &mut ModelIo) -> Result<()> {
        let _ = (ws, io);
        Ok(())
    }

    /// Epoch-boundary notification, e.g. to reseed a deterministic
    /// pseudo-random stream consistently across passes.
    fn end_pass(&mut self, ws: &mut Workspace) {
        let _ = ws;
    }

    /// Post-processing after the driver finishes with an example.
    fn finish_example(&mut self, ws: &mut Workspace, ec: &mut Example) {
        let _ = (ws, ec);
    }

    /// Shutdown hook, invoked exactly once.
    fn finish(&mut self, ws: &mut Workspace) {
        let _ = ws;
    }
}

/// Builds the learner stack bottom-up from a validated configuration.
///
/// Layer order is fixed: `gd` at the bottom, then the scorer, then the
/// feedforward layer when hidden units are configured, then one-against-
/// all when classes are configured. Each optional layer that does not
/// apply is skipped transparently. The address-space partition (each
/// layer's increment) is computed here, bottom-up, exactly once.
///
/// # Errors
///
/// Fails on configuration conflicts.
pub fn build_stack(config: &Config) -> Result<Box<dyn Learner>> {
    config.validate()?;
    let mut stack: Box<dyn Learner> = Box::new(Gd::setup(config));
    stack = Scorer::setup(config, stack)?;
    stack = Nn::setup(config, stack);
    stack = Oaa::setup(config, stack);
    Ok(stack)
}
