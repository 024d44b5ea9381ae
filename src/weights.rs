//! Flat addressable weight table with power-of-two sizing.
//!
//! All trainable state lives in one array of `2^num_bits * stride` slots.
//! A logical address selects a group of `stride` consecutive slots: slot 0
//! is the weight itself, the remaining slots hold auxiliary per-feature
//! state such as adaptive-rate accumulators.
//!
//! Addressing is masked, never bounds-checked: indices that exceed the
//! table wrap silently, and persisted-model compatibility depends on that
//! exact wraparound.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Flat trainable weight array addressed by masked, offset feature indices.
#[derive(Debug, Clone)]
pub struct WeightVector {
    weights: Vec<f32>,
    num_bits: u32,
    stride_shift: u32,
}

impl WeightVector {
    /// Allocates a zeroed table of `2^num_bits` logical addresses with
    /// `2^stride_shift` slots each.
    #[must_use]
    pub fn new(num_bits: u32, stride_shift: u32) -> Self {
        let len = 1usize << (num_bits + stride_shift);
        Self {
            weights: vec![0.0; len],
            num_bits,
            stride_shift,
        }
    }

    /// Fills every primary weight slot with a uniform value in [-0.5, 0.5),
    /// leaving auxiliary slots zeroed. Used by `random_weights` startup.
    pub fn randomize(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let stride = self.stride();
        for i in (0..self.weights.len()).step_by(stride) {
            self.weights[i] = rng.gen::<f32>() - 0.5;
        }
    }

    /// log2 of the number of logical addresses.
    #[must_use]
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// log2 of the per-address slot count.
    #[must_use]
    pub fn stride_shift(&self) -> u32 {
        self.stride_shift
    }

    /// Slots reserved per logical address.
    #[must_use]
    pub fn stride(&self) -> usize {
        1usize << self.stride_shift
    }

    /// Number of logical addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        1usize << self.num_bits
    }

    /// True when the table holds no addresses (never, in practice).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Mask bounding any computed logical address.
    #[must_use]
    pub fn mask(&self) -> u32 {
        (1u32 << self.num_bits) - 1
    }

    /// Combines a raw index with an offset and masks the result.
    ///
    /// Wrapping is saturating-by-design: masking again is a no-op.
    #[inline]
    #[must_use]
    pub fn resolve(&self, raw_index: u32, offset: u32) -> u32 {
        raw_index.wrapping_add(offset) & self.mask()
    }

    /// The weight at a resolved logical address.
    #[inline]
    #[must_use]
    pub fn weight(&self, address: u32) -> f32 {
        self.weights[(address as usize) << self.stride_shift]
    }

    /// Mutable weight at a resolved logical address.
    #[inline]
    pub fn weight_mut(&mut self, address: u32) -> &mut f32 {
        &mut self.weights[(address as usize) << self.stride_shift]
    }

    /// The full stride-wide slot group of a logical address.
    #[inline]
    pub fn entry_mut(&mut self, address: u32) -> &mut [f32] {
        let start = (address as usize) << self.stride_shift;
        let stride = self.stride();
        &mut self.weights[start..start + stride]
    }

    /// Contributes `x * weight[address]` to a running prediction sum.
    #[inline]
    #[must_use]
    pub fn accumulate(&self, address: u32, x: f32) -> f32 {
        x * self.weight(address)
    }

    /// Applies an in-place delta to the weight at a resolved address.
    #[inline]
    pub fn apply_update(&mut self, address: u32, delta: f32) {
        *self.weight_mut(address) += delta;
    }

    /// Iterates (logical address, weight) pairs with a nonzero weight.
    pub fn nonzero(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.weights
            .iter()
            .step_by(self.stride())
            .enumerate()
            .filter(|(_, &w)| w != 0.0)
            .map(|(i, &w)| (i as u32, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sizing_and_mask() {
        let w = WeightVector::new(4, 1);
        assert_eq!(w.len(), 16);
        assert_eq!(w.stride(), 2);
        assert_eq!(w.mask(), 15);
    }

    #[test]
    fn test_resolve_wraps_silently() {
        let w = WeightVector::new(4, 0);
        // 20 & 15 == 4: indices beyond the table wrap, by design.
        assert_eq!(w.resolve(20, 0), 4);
        // Offset addition wraps at u32 before masking.
        assert_eq!(w.resolve(u32::MAX, 1), 0);
    }

    #[test]
    fn test_accumulate_and_update() {
        let mut w = WeightVector::new(4, 1);
        w.apply_update(3, 0.5);
        assert!((w.weight(3) - 0.5).abs() < 1e-6);
        assert!((w.accumulate(3, 2.0) - 1.0).abs() < 1e-6);
        // Auxiliary slot is independent of the primary weight.
        w.entry_mut(3)[1] = 7.0;
        assert!((w.weight(3) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_randomize_seeds_deterministically() {
        let mut a = WeightVector::new(6, 1);
        let mut b = WeightVector::new(6, 1);
        a.randomize(19);
        b.randomize(19);
        for i in 0..a.len() as u32 {
            assert_eq!(a.weight(i), b.weight(i));
            assert!(a.weight(i) >= -0.5 && a.weight(i) < 0.5);
            assert_eq!(a.entry_mut(i)[1], 0.0);
        }
    }

    #[test]
    fn test_nonzero_iterates_logical_addresses() {
        let mut w = WeightVector::new(4, 1);
        w.apply_update(2, 1.0);
        w.apply_update(9, -1.0);
        let pairs: Vec<_> = w.nonzero().collect();
        assert_eq!(pairs, vec![(2, 1.0), (9, -1.0)]);
    }

    proptest! {
        /// Masking is idempotent: resolving an already-resolved address
        /// changes nothing.
        #[test]
        fn prop_resolve_idempotent(raw in any::<u32>(), bits in 1u32..=24) {
            let w = WeightVector::new(bits, 0);
            let once = w.resolve(raw, 0);
            prop_assert_eq!(w.resolve(once, 0), once);
        }

        /// A resolved address never exceeds the mask.
        #[test]
        fn prop_resolve_bounded(raw in any::<u32>(), offset in any::<u32>(), bits in 1u32..=24) {
            let w = WeightVector::new(bits, 0);
            prop_assert!(w.resolve(raw, offset) <= w.mask());
        }
    }
}
