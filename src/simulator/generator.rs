use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Largest accepted upper bound, keeps the cent range well inside i64 and
/// exactly representable as f64
pub const MAX_WATTS_LIMIT: f64 = 1.0e12;

/// Produces uniformly distributed power values with two decimals
pub struct PowerGenerator<R: Rng = StdRng> {
    rng: R,
    min_cents: i64,
    max_cents: i64,
}

impl PowerGenerator<StdRng> {
    pub fn new(min: f64, max: f64) -> Option<Self> {
        return Self::with_rng(StdRng::from_entropy(), min, max);
    }

    pub fn seeded(seed: u64, min: f64, max: f64) -> Option<Self> {
        return Self::with_rng(StdRng::seed_from_u64(seed), min, max);
    }
}

impl<R: Rng> PowerGenerator<R> {
    /// None if the bounds are invalid or no two decimal value fits in between
    pub fn with_rng(rng: R, min: f64, max: f64) -> Option<Self> {
        let (min_cents, max_cents) = cents_range(min, max)?;
        return Some(PowerGenerator { rng, min_cents, max_cents });
    }

    pub fn next_watts(&mut self) -> f64 {
        let cents = self.rng.gen_range(self.min_cents..=self.max_cents);
        return cents as f64 / 100.0;
    }
}

/// Smallest and largest whole cent inside `[min, max]`.
///
/// The comparison is done on the f64 value that ends up on the wire, so
/// `cents / 100.0` is always within the bounds.
pub fn cents_range(min: f64, max: f64) -> Option<(i64, i64)> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max > MAX_WATTS_LIMIT || min > max {
        return None;
    }

    let mut lo = (min * 100.0).floor() as i64 - 1;
    while (lo as f64) / 100.0 < min {
        lo += 1;
    }

    let mut hi = (max * 100.0).ceil() as i64 + 1;
    while (hi as f64) / 100.0 > max {
        hi -= 1;
    }

    if lo > hi {
        return None;
    }
    return Some((lo, hi));
}

pub fn round_to_cents(value: f64) -> f64 {
    return (value * 100.0).round() / 100.0;
}
