//! Weighted discrete selection used by hooks for probabilistic outcomes.
use rand::Rng;
use thiserror::Error;

/// A single candidate with its relative weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weighted<T> {
    pub weight: f64,
    pub value: T,
}

impl<T> Weighted<T> {
    pub const fn new(weight: f64, value: T) -> Self {
        Self { weight, value }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WeightedError {
    #[error("weighted selection requires at least one candidate")]
    Empty,
    #[error("candidate {index} has invalid weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },
}

fn total_weight<T>(items: &[Weighted<T>]) -> Result<f64, WeightedError> {
    if items.is_empty() {
        return Err(WeightedError::Empty);
    }
    items.iter().enumerate().try_fold(0.0, |sum, (index, item)| {
        if item.weight.is_finite() && item.weight >= 0.0 {
            Ok(sum + item.weight)
        } else {
            Err(WeightedError::InvalidWeight {
                index,
                weight: item.weight,
            })
        }
    })
}

/// Pick one candidate with probability proportional to its weight.
///
/// Zero-weight candidates are never drawn unless every weight is zero, in
/// which case the last candidate is returned.
///
/// # Errors
///
/// Returns an error when `items` is empty or any weight is negative or non-finite.
pub fn select_weighted<'a, T, R>(items: &'a [Weighted<T>], rng: &mut R) -> Result<&'a T, WeightedError>
where
    R: Rng + ?Sized,
{
    let total = total_weight(items)?;
    let roll = rng.r#gen::<f64>() * total;
    let mut cumulative = 0.0;
    for item in items {
        cumulative += item.weight;
        if roll < cumulative {
            return Ok(&item.value);
        }
    }
    // Only reachable through floating-point drift or an all-zero table.
    items.last().map(|item| &item.value).ok_or(WeightedError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn frequencies_follow_weights() {
        let table = [Weighted::new(1.0, 'a'), Weighted::new(3.0, 'b')];
        let mut rng = ChaCha20Rng::seed_from_u64(0x5EED);
        let draws = 20_000;
        let b_count = (0..draws)
            .filter(|_| *select_weighted(&table, &mut rng).unwrap() == 'b')
            .count();
        let freq = crate::numbers::ratio(b_count, draws);
        assert!((freq - 0.75).abs() < 0.02, "observed {freq}");
    }

    #[test]
    fn zero_weight_entries_are_unreachable() {
        let table = [
            Weighted::new(0.0, "never"),
            Weighted::new(2.0, "always"),
            Weighted::new(0.0, "never-either"),
        ];
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert_eq!(*select_weighted(&table, &mut rng).unwrap(), "always");
        }
    }

    #[test]
    fn all_zero_falls_back_to_last() {
        let table = [Weighted::new(0.0, 1), Weighted::new(0.0, 2)];
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert_eq!(*select_weighted(&table, &mut rng).unwrap(), 2);
    }

    #[test]
    fn rejects_empty_and_invalid_tables() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let empty: [Weighted<u8>; 0] = [];
        assert_eq!(select_weighted(&empty, &mut rng), Err(WeightedError::Empty));

        let negative = [Weighted::new(1.0, 1), Weighted::new(-1.0, 2)];
        assert!(matches!(
            select_weighted(&negative, &mut rng),
            Err(WeightedError::InvalidWeight { index: 1, .. })
        ));

        let nan = [Weighted::new(f64::NAN, 1)];
        assert!(matches!(
            select_weighted(&nan, &mut rng),
            Err(WeightedError::InvalidWeight { index: 0, .. })
        ));
    }

    #[test]
    fn works_through_dyn_rng() {
        let table = [Weighted::new(1.0, "only")];
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let dyn_rng: &mut dyn rand::RngCore = &mut rng;
        assert_eq!(*select_weighted(&table, dyn_rng).unwrap(), "only");
    }
}
