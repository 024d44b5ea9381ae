//! The shared mutable example record threaded through the learner stack.
//!
//! An [`Example`] groups sparse features by namespace, carries a label and a
//! matching prediction variant, and caches the sum of squared feature values
//! used by norm-dependent update rules. Wrapping learners remap the same
//! physical example into disjoint address sub-ranges by shifting
//! [`Example::ft_offset`]; raw indices are never dereferenced without being
//! combined with the offset and masked first.

/// Number of addressable namespaces. Namespace ids are single bytes.
pub const NUM_NAMESPACES: usize = 256;

/// Namespace holding the implicit constant (bias) feature.
pub const CONSTANT_NAMESPACE: u8 = 128;

/// Namespace reserved for synthetic hidden-unit output features.
pub const NN_OUTPUT_NAMESPACE: u8 = 129;

/// Raw index of the constant (bias) feature.
pub const CONSTANT_HASH: u32 = 11_650_396;

/// Sentinel for "no label": an unlabeled simple example carries this value.
pub const NO_LABEL: f32 = f32::MAX;

/// A single sparse feature: a value and a raw 32-bit index.
///
/// Immutable once produced by the parser. The index is a hash, not a
/// validated table address; it only becomes an address after offsetting
/// and masking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    /// Feature value (multiplied into the dot product).
    pub value: f32,
    /// Raw 32-bit index, combined with `ft_offset` and masked on access.
    pub index: u32,
}

impl Feature {
    /// Creates a feature.
    #[must_use]
    pub const fn new(value: f32, index: u32) -> Self {
        Self { value, index }
    }
}

/// Simple regression/classification label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleLabel {
    /// Target value; [`NO_LABEL`] when the example is unlabeled.
    pub label: f32,
    /// Importance weight.
    pub weight: f32,
    /// Initial value the prediction accumulates from.
    pub initial: f32,
}

impl SimpleLabel {
    /// Labeled example with unit importance.
    #[must_use]
    pub const fn new(label: f32) -> Self {
        Self {
            label,
            weight: 1.0,
            initial: 0.0,
        }
    }

    /// Unlabeled (test) example.
    #[must_use]
    pub const fn unlabeled() -> Self {
        Self {
            label: NO_LABEL,
            weight: 1.0,
            initial: 0.0,
        }
    }

    /// True when a target value is present.
    #[must_use]
    pub fn is_labeled(&self) -> bool {
        self.label != NO_LABEL
    }
}

impl Default for SimpleLabel {
    fn default() -> Self {
        Self::unlabeled()
    }
}

/// Per-class cost for cost-sensitive tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassCost {
    /// 1-based class id.
    pub class: u32,
    /// Cost of predicting this class.
    pub cost: f32,
}

/// Label variant, tagged by task.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// Simple regression / binary classification.
    Simple(SimpleLabel),
    /// Multiclass: 1-based class id plus importance weight.
    Multiclass {
        /// 1-based class id; 0 means unlabeled.
        class: u32,
        /// Importance weight.
        weight: f32,
    },
    /// Cost-sensitive multiclass.
    CostSensitive(Vec<ClassCost>),
    /// Multilabel: set of relevant 1-based class ids.
    Multilabel(Vec<u32>),
}

impl Default for Label {
    fn default() -> Self {
        Label::Simple(SimpleLabel::unlabeled())
    }
}

impl Label {
    /// Returns the simple label, or a default unlabeled one for other kinds.
    #[must_use]
    pub fn simple(&self) -> SimpleLabel {
        match self {
            Label::Simple(s) => *s,
            _ => SimpleLabel::unlabeled(),
        }
    }
}

/// Prediction variant matching the label kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Scalar regression / score output.
    Scalar(f32),
    /// Predicted 1-based class.
    Multiclass(u32),
    /// Predicted set of 1-based classes.
    Multilabels(Vec<u32>),
}

impl Default for Prediction {
    fn default() -> Self {
        Prediction::Scalar(0.0)
    }
}

impl Prediction {
    /// Returns the scalar prediction, or 0.0 for non-scalar variants.
    #[must_use]
    pub fn scalar(&self) -> f32 {
        match self {
            Prediction::Scalar(v) => *v,
            _ => 0.0,
        }
    }

    /// Returns the predicted class, or 0 for non-multiclass variants.
    #[must_use]
    pub fn multiclass(&self) -> u32 {
        match self {
            Prediction::Multiclass(c) => *c,
            _ => 0,
        }
    }
}

/// The shared mutable record threaded through the learner stack.
///
/// Features are grouped by namespace: `indices` lists the active namespace
/// ids in insertion order and `atomics[ns]` holds that namespace's features.
/// Layers that temporarily mutate an example (label, offset, namespace
/// contents) must restore every mutated field before returning.
#[derive(Debug, Clone)]
pub struct Example {
    /// Active namespace ids, in insertion order.
    pub indices: Vec<u8>,
    /// Features per namespace.
    pub atomics: Vec<Vec<Feature>>,
    /// Sum of squared feature values per namespace.
    pub sum_feat_sq: Vec<f32>,
    /// Cached total sum of squared feature values.
    pub total_sum_feat_sq: f32,
    /// Index offset added to every raw index before masking.
    pub ft_offset: u32,
    /// Label variant for the task at hand.
    pub label: Label,
    /// Prediction variant, written by the stack.
    pub pred: Prediction,
    /// Raw accumulated dot product before finalization.
    pub partial_prediction: f32,
    /// Loss charged to this example by the scoring layer.
    pub loss: f32,
    /// Opaque caller tag carried through the stack.
    pub tag: String,
    /// Number of features, maintained by `push_feature`.
    pub num_features: usize,
    /// Example counter position, used for learning-rate schedules.
    pub example_t: f32,
}

impl Default for Example {
    fn default() -> Self {
        Self::new()
    }
}

impl Example {
    /// Creates an empty example.
    #[must_use]
    pub fn new() -> Self {
        Self {
            indices: Vec::new(),
            atomics: vec![Vec::new(); NUM_NAMESPACES],
            sum_feat_sq: vec![0.0; NUM_NAMESPACES],
            total_sum_feat_sq: 0.0,
            ft_offset: 0,
            label: Label::default(),
            pred: Prediction::default(),
            partial_prediction: 0.0,
            loss: 0.0,
            tag: String::new(),
            num_features: 0,
            example_t: 0.0,
        }
    }

    /// Adds a feature to a namespace, updating the squared-norm caches.
    pub fn push_feature(&mut self, ns: u8, feature: Feature) {
        let slot = ns as usize;
        if self.atomics[slot].is_empty() {
            self.indices.push(ns);
        }
        self.atomics[slot].push(feature);
        let sq = feature.value * feature.value;
        self.sum_feat_sq[slot] += sq;
        self.total_sum_feat_sq += sq;
        self.num_features += 1;
    }

    /// Appends the constant (bias) feature.
    pub fn push_constant(&mut self) {
        self.push_feature(CONSTANT_NAMESPACE, Feature::new(1.0, CONSTANT_HASH));
    }

    /// Clears all features and per-call metadata so the allocation can be
    /// reused for the next input line.
    pub fn reset(&mut self) {
        for &ns in &self.indices {
            self.atomics[ns as usize].clear();
            self.sum_feat_sq[ns as usize] = 0.0;
        }
        self.indices.clear();
        self.total_sum_feat_sq = 0.0;
        self.ft_offset = 0;
        self.label = Label::default();
        self.pred = Prediction::default();
        self.partial_prediction = 0.0;
        self.loss = 0.0;
        self.tag.clear();
        self.num_features = 0;
        self.example_t = 0.0;
    }

    /// Features of one namespace.
    #[must_use]
    pub fn namespace(&self, ns: u8) -> &[Feature] {
        &self.atomics[ns as usize]
    }

    /// True when no namespace holds any feature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_feature_tracks_norms() {
        let mut ec = Example::new();
        ec.push_feature(b'a', Feature::new(2.0, 1));
        ec.push_feature(b'a', Feature::new(3.0, 2));
        ec.push_feature(b'b', Feature::new(1.0, 5));

        assert_eq!(ec.indices, vec![b'a', b'b']);
        assert_eq!(ec.namespace(b'a').len(), 2);
        assert_eq!(ec.num_features, 3);
        assert!((ec.sum_feat_sq[b'a' as usize] - 13.0).abs() < 1e-6);
        assert!((ec.total_sum_feat_sq - 14.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ec = Example::new();
        ec.push_feature(b'x', Feature::new(1.5, 7));
        ec.ft_offset = 42;
        ec.label = Label::Simple(SimpleLabel::new(1.0));
        ec.reset();

        assert!(ec.is_empty());
        assert_eq!(ec.ft_offset, 0);
        assert_eq!(ec.total_sum_feat_sq, 0.0);
        assert!(ec.namespace(b'x').is_empty());
        assert!(!ec.label.simple().is_labeled());
    }

    #[test]
    fn test_constant_feature() {
        let mut ec = Example::new();
        ec.push_constant();
        assert_eq!(ec.indices, vec![CONSTANT_NAMESPACE]);
        assert_eq!(ec.namespace(CONSTANT_NAMESPACE)[0].index, CONSTANT_HASH);
    }

    #[test]
    fn test_unlabeled_simple_label() {
        let ld = SimpleLabel::unlabeled();
        assert!(!ld.is_labeled());
        assert!(SimpleLabel::new(-1.0).is_labeled());
    }

    #[test]
    fn test_prediction_accessors() {
        assert_eq!(Prediction::Scalar(0.5).scalar(), 0.5);
        assert_eq!(Prediction::Multiclass(3).multiclass(), 3);
        assert_eq!(Prediction::Multiclass(3).scalar(), 0.0);
    }
}
