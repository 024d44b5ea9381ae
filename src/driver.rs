//! The outer learning loop: pull examples, dispatch, account, report.
//!
//! The driver owns no learning logic. It pulls parsed examples from an
//! [`ExampleSource`], hands each to the top of the stack exactly once,
//! folds the charged loss into the shared statistics, and emits progress
//! rows on a doubling (or fixed-step) schedule. Examples stream through a
//! bounded channel when parsing runs on its own thread; the learning loop
//! itself is single-threaded.

use std::io::Write;
use std::sync::mpsc::{Receiver, SyncSender};

use crate::error::Result;
use crate::example::{Example, Label, Prediction};
use crate::learner::Learner;
use crate::workspace::Workspace;

/// Supplies parsed examples to the driver, one pass at a time.
pub trait ExampleSource {
    /// The next example of the current pass, or `None` at pass end.
    fn next_example(&mut self) -> Option<Example>;

    /// Returns a finished example for allocation reuse.
    fn recycle(&mut self, ec: Example);

    /// Restarts the source for another pass.
    fn rewind(&mut self);
}

/// In-memory source replaying a fixed set of examples every pass.
pub struct VecSource {
    examples: Vec<Example>,
    cursor: usize,
}

impl VecSource {
    /// Wraps a pre-parsed example set.
    #[must_use]
    pub fn new(examples: Vec<Example>) -> Self {
        Self {
            examples,
            cursor: 0,
        }
    }
}

impl ExampleSource for VecSource {
    fn next_example(&mut self) -> Option<Example> {
        let ec = self.examples.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(ec)
    }

    fn recycle(&mut self, _ec: Example) {}

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Streaming source fed by a parser thread over a bounded channel.
///
/// Backpressure comes from the channel bound: a fast parser blocks once
/// the learner falls behind. A channel source supports a single pass;
/// rewinding is a no-op and the pass ends when the sender hangs up.
pub struct ChannelSource {
    receiver: Receiver<Example>,
}

/// Creates a bounded example channel: the sender goes to the parser
/// thread, the source to the driver.
#[must_use]
pub fn bounded_channel(capacity: usize) -> (SyncSender<Example>, ChannelSource) {
    let (sender, receiver) = std::sync::mpsc::sync_channel(capacity);
    (sender, ChannelSource { receiver })
}

impl ExampleSource for ChannelSource {
    fn next_example(&mut self) -> Option<Example> {
        self.receiver.recv().ok()
    }

    fn recycle(&mut self, _ec: Example) {}

    fn rewind(&mut self) {}
}

fn is_labeled(label: &Label) -> bool {
    match label {
        Label::Simple(simple) => simple.is_labeled(),
        Label::Multiclass { class, .. } => *class > 0,
        Label::CostSensitive(costs) => !costs.is_empty(),
        Label::Multilabel(_) => true,
    }
}

fn importance(label: &Label) -> f32 {
    match label {
        Label::Simple(simple) => simple.weight,
        Label::Multiclass { weight, .. } => *weight,
        _ => 1.0,
    }
}

fn label_value(label: &Label) -> f64 {
    match label {
        Label::Simple(simple) if simple.is_labeled() => f64::from(simple.label),
        _ => 0.0,
    }
}

fn label_display(label: &Label) -> String {
    match label {
        Label::Simple(simple) if simple.is_labeled() => format!("{:.4}", simple.label),
        Label::Multiclass { class, .. } if *class > 0 => class.to_string(),
        _ => "unknown".to_string(),
    }
}

fn pred_display(pred: &Prediction) -> String {
    match pred {
        Prediction::Scalar(v) => format!("{v:.4}"),
        Prediction::Multiclass(c) => c.to_string(),
        Prediction::Multilabels(set) => format!("{} labels", set.len()),
    }
}

/// Runs the full learning loop: `ws.passes` passes over the source,
/// training when labels are available, predicting otherwise.
///
/// # Errors
///
/// Propagates stack failures; the loop stops at the first error.
pub fn run<S: ExampleSource>(
    ws: &mut Workspace,
    stack: &mut dyn Learner,
    source: &mut S,
) -> Result<()> {
    let mut err = std::io::stderr();
    if !ws.quiet {
        crate::stats::SharedStats::print_header(&mut err);
    }

    for _ in 0..ws.passes {
        while let Some(mut ec) = source.next_example() {
            if ws.training {
                stack.learn(ws, &mut ec, 0);
            } else {
                stack.predict(ws, &mut ec, 0);
            }

            let weight = if is_labeled(&ec.label) {
                f64::from(importance(&ec.label))
            } else {
                0.0
            };
            let weighted_label = label_value(&ec.label) * weight;
            ws.sd.update(f64::from(ec.loss), weighted_label, weight, ec.num_features);

            if !ws.quiet && ws.sd.weighted_examples >= f64::from(ws.sd.dump_interval) {
                let label = label_display(&ec.label);
                let pred = pred_display(&ec.pred);
                let (progress_add, progress_arg) = (ws.progress_add, ws.progress_arg);
                ws.sd.print_update(
                    &mut err,
                    &label,
                    &pred,
                    ec.num_features,
                    progress_add,
                    progress_arg,
                );
            }

            stack.finish_example(ws, &mut ec);
            source.recycle(ec);
        }
        stack.end_pass(ws);
        ws.current_pass += 1;
        source.rewind();
    }
    stack.finish(ws);

    if !ws.quiet {
        let _ = writeln!(err, "\nfinished run");
        let _ = writeln!(err, "number of examples = {}", ws.sd.example_number);
        let _ = writeln!(err, "weighted example sum = {:.6}", ws.sd.weighted_examples);
        let _ = writeln!(err, "average loss = {:.6}", ws.sd.average_loss());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::example::{Feature, SimpleLabel};
    use crate::learner::build_stack;

    fn regression_example(label: f32, index: u32) -> Example {
        let mut ec = Example::new();
        ec.push_feature(b'a', Feature::new(1.0, index));
        ec.push_constant();
        ec.label = Label::Simple(SimpleLabel::new(label));
        ec
    }

    fn quiet_config() -> Config {
        let mut config = Config::new().with_bits(12);
        config.quiet = true;
        config
    }

    #[test]
    fn test_multi_pass_training_converges() {
        let config = quiet_config().with_passes(10).with_learning_rate(0.5);
        let mut ws = Workspace::new(&config).unwrap();
        let mut stack = build_stack(&config).unwrap();
        let mut source = VecSource::new(vec![
            regression_example(1.0, 10),
            regression_example(-1.0, 20),
        ]);
        run(&mut ws, stack.as_mut(), &mut source).unwrap();

        assert_eq!(ws.sd.example_number, 20);
        assert_eq!(ws.current_pass, 10);
        let mut probe = regression_example(f32::MAX, 10);
        probe.label = Label::Simple(SimpleLabel::unlabeled());
        stack.predict(&mut ws, &mut probe, 0);
        assert!(probe.pred.scalar() > 0.5, "pred {}", probe.pred.scalar());
    }

    #[test]
    fn test_unlabeled_examples_carry_no_weight() {
        let config = quiet_config();
        let mut ws = Workspace::new(&config).unwrap();
        let mut stack = build_stack(&config).unwrap();
        let mut unlabeled = regression_example(0.0, 5);
        unlabeled.label = Label::Simple(SimpleLabel::unlabeled());
        let mut source = VecSource::new(vec![regression_example(1.0, 5), unlabeled]);
        run(&mut ws, stack.as_mut(), &mut source).unwrap();
        assert_eq!(ws.sd.example_number, 2);
        assert!((ws.sd.weighted_examples - 1.0).abs() < 1e-9);
        // Only the labeled example contributes its label * weight.
        assert!((ws.sd.weighted_labels - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_source_streams_from_parser_thread() {
        let config = quiet_config();
        let mut ws = Workspace::new(&config).unwrap();
        let mut stack = build_stack(&config).unwrap();
        let (sender, mut source) = bounded_channel(4);

        let parser = std::thread::spawn(move || {
            for i in 0..50 {
                let ec = regression_example(if i % 2 == 0 { 1.0 } else { -1.0 }, 30 + i % 2);
                sender.send(ec).unwrap();
            }
        });
        run(&mut ws, stack.as_mut(), &mut source).unwrap();
        parser.join().unwrap();
        assert_eq!(ws.sd.example_number, 50);
    }

    #[test]
    fn test_prediction_only_mode_leaves_weights() {
        let mut config = quiet_config();
        config.training = false;
        let mut ws = Workspace::new(&config).unwrap();
        let mut stack = build_stack(&config).unwrap();
        let mut source = VecSource::new(vec![regression_example(1.0, 5)]);
        run(&mut ws, stack.as_mut(), &mut source).unwrap();
        assert_eq!(ws.weights.nonzero().count(), 0);
        // Loss is still reported against the labels.
        assert!(ws.sd.sum_loss > 0.0);
    }

    #[test]
    fn test_label_and_pred_display() {
        assert_eq!(label_display(&Label::Simple(SimpleLabel::new(0.5))), "0.5000");
        assert_eq!(
            label_display(&Label::Simple(SimpleLabel::unlabeled())),
            "unknown"
        );
        assert_eq!(label_display(&Label::Multiclass { class: 3, weight: 1.0 }), "3");
        assert_eq!(pred_display(&Prediction::Scalar(1.25)), "1.2500");
        assert_eq!(pred_display(&Prediction::Multiclass(2)), "2");
    }
}
