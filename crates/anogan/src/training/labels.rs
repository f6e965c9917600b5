//! Real/fake label targets with soft labeling and stochastic flipping.

use rand::Rng;

/// Width of the uniform band soft labels are drawn from.
pub const SOFT_LABEL_WIDTH: f32 = 0.1;

/// Label targets for one sub-step, one value per batch element.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelBundle {
    /// Targets for the real branch (and the generator's fooling target).
    pub true_labels: Vec<f32>,
    /// Targets for the generated branch.
    pub generated_labels: Vec<f32>,
}

/// Label generation settings.
///
/// `soft` and `invert` are independent: `invert` swaps which vector is
/// returned as the true-class vector, whatever mode produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPolicy {
    pub soft: bool,
    /// Fraction of each vector to flip (`v → 1 − v`) in soft mode.
    pub flip_probability: f64,
    pub invert: bool,
}

impl LabelPolicy {
    pub fn new(soft: bool, flip_probability: f64, invert: bool) -> Self {
        Self { soft, flip_probability, invert }
    }

    /// Draw a fresh label bundle.
    ///
    /// Hard mode: ones for real, zeros for generated. Soft mode: real in
    /// `[0.9, 1.0]`, generated in `[0, 0.1]`, then `round(p · batch_size)`
    /// positions of each vector (drawn independently, with replacement) are
    /// flipped.
    pub fn labels<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> LabelBundle {
        let (true_labels, generated_labels) = if self.soft {
            let mut generated: Vec<f32> = (0..batch_size)
                .map(|_| rng.gen_range(0.0..SOFT_LABEL_WIDTH))
                .collect();
            let idx = flip_indices(rng, batch_size, self.flip_probability);
            apply_flips(&mut generated, &idx);

            let mut real: Vec<f32> = (0..batch_size)
                .map(|_| 1.0 - rng.gen_range(0.0..SOFT_LABEL_WIDTH))
                .collect();
            let idx = flip_indices(rng, batch_size, self.flip_probability);
            apply_flips(&mut real, &idx);

            (real, generated)
        } else {
            (vec![1.0; batch_size], vec![0.0; batch_size])
        };

        if self.invert {
            LabelBundle { true_labels: generated_labels, generated_labels: true_labels }
        } else {
            LabelBundle { true_labels, generated_labels }
        }
    }
}

/// Number of positions flipped per vector: `round(p · len)`.
pub fn flip_count(len: usize, flip_probability: f64) -> usize {
    (flip_probability * len as f64).round() as usize
}

/// Draw [`flip_count`] indices in `0..len`, uniformly with replacement.
pub fn flip_indices<R: Rng + ?Sized>(rng: &mut R, len: usize, flip_probability: f64) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    (0..flip_count(len, flip_probability))
        .map(|_| rng.gen_range(0..len))
        .collect()
}

/// Replace `values[i]` with `1 − values[i]` for each selected index.
///
/// Flips read the original vector, so an index drawn twice is flipped once.
fn apply_flips(values: &mut [f32], indices: &[usize]) {
    let original = values.to_vec();
    for &i in indices {
        values[i] = 1.0 - original[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_hard_labels_any_batch_size() {
        let mut rng = StdRng::seed_from_u64(0);
        let policy = LabelPolicy::new(false, 0.5, false);
        for batch in [0, 1, 7, 64] {
            let bundle = policy.labels(&mut rng, batch);
            assert_eq!(bundle.true_labels, vec![1.0; batch]);
            assert_eq!(bundle.generated_labels, vec![0.0; batch]);
        }
    }

    #[test]
    fn test_soft_labels_ranges_without_flips() {
        let mut rng = StdRng::seed_from_u64(1);
        let policy = LabelPolicy::new(true, 0.0, false);
        let bundle = policy.labels(&mut rng, 256);
        assert!(bundle.true_labels.iter().all(|v| (0.9..=1.0).contains(v)), "true labels in [0.9, 1]");
        assert!(bundle.generated_labels.iter().all(|v| (0.0..=0.1).contains(v)), "generated labels in [0, 0.1]");
    }

    #[test]
    fn test_flip_count_rounds() {
        assert_eq!(flip_count(64, 0.05), 3); // 3.2
        assert_eq!(flip_count(10, 0.25), 3); // 2.5 rounds away from zero
        assert_eq!(flip_count(10, 0.0), 0);
        assert_eq!(flip_count(4, 1.0), 4);
    }

    #[test]
    fn test_flip_indices_draw_exact_count_in_range() {
        let mut rng = StdRng::seed_from_u64(2);
        for (len, p) in [(64, 0.05), (10, 0.25), (3, 1.0), (100, 0.5)] {
            let idx = flip_indices(&mut rng, len, p);
            assert_eq!(idx.len(), flip_count(len, p), "len={len} p={p}");
            assert!(idx.iter().all(|&i| i < len));
        }
        assert!(flip_indices(&mut rng, 0, 1.0).is_empty());
    }

    #[test]
    fn test_flipped_values_leave_band() {
        // With p = 1 every flipped position lands in the opposite band.
        let mut rng = StdRng::seed_from_u64(3);
        let bundle = LabelPolicy::new(true, 1.0, false).labels(&mut rng, 32);
        let flipped_true = bundle.true_labels.iter().filter(|&&v| v <= 0.1).count();
        let flipped_gen = bundle.generated_labels.iter().filter(|&&v| v >= 0.9).count();
        assert!(flipped_true > 0 && flipped_true <= 32);
        assert!(flipped_gen > 0 && flipped_gen <= 32);
        assert!(bundle
            .true_labels
            .iter()
            .chain(&bundle.generated_labels)
            .all(|v| (0.0..=0.1).contains(v) || (0.9..=1.0).contains(v)));
    }

    #[test]
    fn test_duplicate_indices_flip_once() {
        let mut values = vec![0.05_f32, 0.02];
        apply_flips(&mut values, &[0, 0, 0]);
        assert!((values[0] - 0.95).abs() < 1e-6);
        assert!((values[1] - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_invert_swaps_for_identical_draws() {
        for soft in [false, true] {
            let plain = LabelPolicy::new(soft, 0.1, false).labels(&mut StdRng::seed_from_u64(5), 16);
            let inverted = LabelPolicy::new(soft, 0.1, true).labels(&mut StdRng::seed_from_u64(5), 16);
            assert_eq!(inverted.true_labels, plain.generated_labels, "soft={soft}");
            assert_eq!(inverted.generated_labels, plain.true_labels, "soft={soft}");
        }
    }
}
