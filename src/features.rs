//! Feature iteration and cross-feature expansion.
//!
//! This is the single choke point producing (index, value) pairs for both
//! prediction accumulation and update passes: base learners differ only in
//! what they do with each pair, never in how the pair is produced.
//!
//! Pairwise and triple crosses are synthesized on the fly by combining the
//! outer features' raw indices with reserved multiplicative constants,
//! which places crossed weights in an address sub-space disjoint from
//! plain single features. All combined-index arithmetic is wrapping u32;
//! persisted-model compatibility depends on that exact truncation.

use crate::example::{Example, Feature};
use crate::weights::WeightVector;

/// Multiplier separating pairwise-crossed features from plain ones.
pub const QUADRATIC_CONSTANT: u32 = 27_942_141;

/// First multiplier for triple crosses.
pub const CUBIC_CONSTANT: u32 = 21_791;

/// Second multiplier for triple crosses.
pub const CUBIC_CONSTANT2: u32 = 37_663;

/// Declared namespace crosses, fixed at configuration time.
#[derive(Debug, Clone, Default)]
pub struct Interactions {
    /// Namespace pairs expanded quadratically.
    pub pairs: Vec<[u8; 2]>,
    /// Namespace triples expanded cubically.
    pub triples: Vec<[u8; 3]>,
}

impl Interactions {
    /// No crosses.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

/// Iterates one namespace slice, invoking the accumulator with
/// `(mult * value, raw_index + offset)` per feature. The yielded index is
/// combined but unmasked; callers mask on access.
#[inline]
pub fn foreach_feature_in<F>(features: &[Feature], offset: u32, mult: f32, f: &mut F)
where
    F: FnMut(f32, u32),
{
    for feat in features {
        f(mult * feat.value, feat.index.wrapping_add(offset));
    }
}

/// Iterates every effective feature of an example: all plain namespaces,
/// then the declared pairwise and triple crosses.
///
/// Expansion order across declared pairs/triples affects only the
/// summation order of accumulated floats, never the set of pairs produced.
pub fn foreach_feature<F>(interactions: &Interactions, ec: &Example, f: &mut F)
where
    F: FnMut(f32, u32),
{
    let offset = ec.ft_offset;

    for &ns in &ec.indices {
        foreach_feature_in(ec.namespace(ns), offset, 1.0, f);
    }

    for pair in &interactions.pairs {
        let outer = ec.namespace(pair[0]);
        if outer.is_empty() {
            continue;
        }
        for a in outer {
            let halfhash = QUADRATIC_CONSTANT.wrapping_mul(a.index).wrapping_add(offset);
            foreach_feature_in(ec.namespace(pair[1]), halfhash, a.value, f);
        }
    }

    for triple in &interactions.triples {
        if ec.namespace(triple[0]).is_empty()
            || ec.namespace(triple[1]).is_empty()
            || ec.namespace(triple[2]).is_empty()
        {
            continue;
        }
        for a in ec.namespace(triple[0]) {
            for b in ec.namespace(triple[1]) {
                let inner = CUBIC_CONSTANT.wrapping_mul(a.index).wrapping_add(b.index);
                let halfhash = CUBIC_CONSTANT2.wrapping_mul(inner).wrapping_add(offset);
                foreach_feature_in(ec.namespace(triple[2]), halfhash, a.value * b.value, f);
            }
        }
    }
}

/// Accumulates the dot product of an example against the weight table,
/// starting from the simple label's initial value.
#[must_use]
pub fn inline_predict(weights: &WeightVector, interactions: &Interactions, ec: &Example) -> f32 {
    let mut sum = ec.label.simple().initial;
    foreach_feature(interactions, ec, &mut |x, index| {
        sum += weights.accumulate(index & weights.mask(), x);
    });
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example::Feature;

    fn two_namespace_example() -> Example {
        let mut ec = Example::new();
        ec.push_feature(b'a', Feature::new(2.0, 1));
        ec.push_feature(b'a', Feature::new(3.0, 2));
        ec.push_feature(b'b', Feature::new(1.0, 5));
        ec
    }

    #[test]
    fn test_plain_iteration_visits_each_feature_once() {
        let ec = two_namespace_example();
        let mut seen = Vec::new();
        foreach_feature(&Interactions::none(), &ec, &mut |x, i| seen.push((x, i)));
        assert_eq!(seen, vec![(2.0, 1), (3.0, 2), (1.0, 5)]);
    }

    #[test]
    fn test_offset_applied_to_every_index() {
        let mut ec = two_namespace_example();
        ec.ft_offset = 100;
        let mut seen = Vec::new();
        foreach_feature(&Interactions::none(), &ec, &mut |_, i| seen.push(i));
        assert_eq!(seen, vec![101, 102, 105]);
    }

    #[test]
    fn test_pairwise_expansion_count() {
        // nA * nB accumulator invocations for the crossed part.
        let ec = two_namespace_example();
        let interactions = Interactions {
            pairs: vec![[b'a', b'b']],
            triples: vec![],
        };
        let mut count = 0usize;
        foreach_feature(&interactions, &ec, &mut |_, _| count += 1);
        // 3 plain features + 2*1 crossed.
        assert_eq!(count, 5);
    }

    #[test]
    fn test_pairwise_combined_addresses() {
        // a = {(1,2),(2,3)}, b = {(5,1)}, cross (a,b).
        let ec = two_namespace_example();
        let interactions = Interactions {
            pairs: vec![[b'a', b'b']],
            triples: vec![],
        };
        let mut crossed = Vec::new();
        foreach_feature(&interactions, &ec, &mut |x, i| {
            if i > 100 {
                crossed.push((x, i));
            }
        });
        assert_eq!(crossed.len(), 2);
        assert_eq!(
            crossed[0],
            (2.0, QUADRATIC_CONSTANT.wrapping_mul(1).wrapping_add(5))
        );
        assert_eq!(
            crossed[1],
            (3.0, QUADRATIC_CONSTANT.wrapping_mul(2).wrapping_add(5))
        );
    }

    #[test]
    fn test_cubic_expansion_count_and_multiplier() {
        let mut ec = two_namespace_example();
        ec.push_feature(b'c', Feature::new(4.0, 9));
        ec.push_feature(b'c', Feature::new(5.0, 10));
        let interactions = Interactions {
            pairs: vec![],
            triples: vec![[b'a', b'b', b'c']],
        };
        let mut crossed = Vec::new();
        foreach_feature(&interactions, &ec, &mut |x, i| crossed.push((x, i)));
        // 5 plain + nA*nB*nC = 2*1*2 crossed.
        assert_eq!(crossed.len(), 9);
        let inner = CUBIC_CONSTANT.wrapping_mul(1).wrapping_add(5);
        let halfhash = CUBIC_CONSTANT2.wrapping_mul(inner);
        // First cubic term: a=(1,2.0), b=(5,1.0), c=(9,4.0).
        assert_eq!(crossed[5], (8.0, halfhash.wrapping_add(9)));
    }

    #[test]
    fn test_empty_outer_namespace_skips_cross() {
        let mut ec = Example::new();
        ec.push_feature(b'b', Feature::new(1.0, 5));
        let interactions = Interactions {
            pairs: vec![[b'a', b'b']],
            triples: vec![],
        };
        let mut count = 0usize;
        foreach_feature(&interactions, &ec, &mut |_, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_inline_predict_accumulates_masked() {
        let mut weights = WeightVector::new(4, 0);
        let ec = two_namespace_example();
        weights.apply_update(1, 0.5); // feature (1, 2.0)
        weights.apply_update(5, 1.0); // feature (5, 1.0)
        let p = inline_predict(&weights, &Interactions::none(), &ec);
        assert!((p - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_index_arithmetic_wraps() {
        let mut ec = Example::new();
        ec.push_feature(b'a', Feature::new(1.0, u32::MAX));
        ec.push_feature(b'b', Feature::new(1.0, 1));
        let interactions = Interactions {
            pairs: vec![[b'a', b'b']],
            triples: vec![],
        };
        let mut crossed = Vec::new();
        foreach_feature(&interactions, &ec, &mut |x, i| crossed.push((x, i)));
        // Combined index truncates silently at u32.
        let expected = QUADRATIC_CONSTANT.wrapping_mul(u32::MAX).wrapping_add(1);
        assert_eq!(crossed[2], (1.0, expected));
    }
}
