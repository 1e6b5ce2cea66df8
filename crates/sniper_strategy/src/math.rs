//! Probability and sizing math.
//!
//! Pure functions: American-odds conversion, two-way devigging, and
//! fractional-Kelly stake sizing. Nothing here touches shared state.

use common::Error;

/// Convert American odds to an implied probability in (0, 1).
///
/// Zero is not a representable price in the American convention and is
/// rejected rather than treated as even money.
pub fn implied_probability(american: i64) -> Result<f64, Error> {
    if american == 0 {
        return Err(Error::InvalidOdds(american));
    }
    if american > 0 {
        Ok(100.0 / (american as f64 + 100.0))
    } else {
        let a = american.unsigned_abs() as f64;
        Ok(a / (a + 100.0))
    }
}

/// Remove the bookmaker margin from a two-outcome market by proportional
/// normalization, so the returned pair sums to 1.
///
/// A degenerate market (raw probabilities summing to zero) yields
/// `(0.0, 0.0)` — callers must treat that as "no signal", not an error.
pub fn devig_two_way(odds_a: i64, odds_b: i64) -> Result<(f64, f64), Error> {
    let p_a = implied_probability(odds_a)?;
    let p_b = implied_probability(odds_b)?;
    let total = p_a + p_b;
    if total == 0.0 {
        return Ok((0.0, 0.0));
    }
    Ok((p_a / total, p_b / total))
}

/// Kelly fraction for a given edge and payout ratio (`b` in the Kelly
/// formula). Clamped to `[0, ∞)`; a non-positive payout yields 0 so an
/// inverted market can never produce a stake.
pub fn kelly_fraction(edge: f64, payout: f64) -> f64 {
    if payout <= 0.0 {
        return 0.0;
    }
    (edge / payout).max(0.0)
}

/// Stake in the same unit as `bankroll`, scaled by a fraction-of-Kelly
/// multiplier. Never negative.
pub fn kelly_stake(bankroll: f64, edge: f64, payout: f64, multiplier: f64) -> f64 {
    (bankroll * kelly_fraction(edge, payout) * multiplier).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_even_money_both_signs() {
        assert!((implied_probability(100).unwrap() - 0.5).abs() < EPS);
        assert!((implied_probability(-100).unwrap() - 0.5).abs() < EPS);
    }

    #[test]
    fn test_monotonic_in_magnitude() {
        // Positive odds: longer shots imply lower probability.
        let mut prev = implied_probability(100).unwrap();
        for odds in [150, 200, 400, 1000] {
            let p = implied_probability(odds).unwrap();
            assert!(p < prev, "+{} should imply less than previous", odds);
            prev = p;
        }

        // Negative odds: heavier favorites imply higher probability, so
        // probability decreases as |odds| shrinks toward -100.
        let mut prev = implied_probability(-1000).unwrap();
        for odds in [-400, -200, -150, -100] {
            let p = implied_probability(odds).unwrap();
            assert!(p < prev, "{} should imply less than previous", odds);
            prev = p;
        }
    }

    #[test]
    fn test_zero_odds_rejected() {
        assert!(matches!(
            implied_probability(0),
            Err(Error::InvalidOdds(0))
        ));
    }

    #[test]
    fn test_devig_sums_to_one() {
        for (a, b) in [(-150, 130), (-110, -110), (250, -300), (100, 100)] {
            let (fair_a, fair_b) = devig_two_way(a, b).unwrap();
            assert!(
                (fair_a + fair_b - 1.0).abs() < EPS,
                "devig({}, {}) should sum to 1",
                a,
                b
            );
        }
    }

    #[test]
    fn test_devig_known_value() {
        // -150/+130: raw 0.6 and 0.4348, normalized home side ≈ 0.58.
        let (fair_a, _) = devig_two_way(-150, 130).unwrap();
        assert!((fair_a - 0.5798).abs() < 0.001);
    }

    #[test]
    fn test_kelly_fraction_clamps() {
        assert_eq!(kelly_fraction(-0.05, 1.0), 0.0);
        assert_eq!(kelly_fraction(0.1, 0.0), 0.0);
        assert_eq!(kelly_fraction(0.1, -2.0), 0.0);
        assert!(kelly_fraction(0.1, 1.0) > 0.0);
    }

    #[test]
    fn test_kelly_stake_never_negative_or_nan() {
        for (bankroll, edge, payout, mult) in [
            (1000.0, -0.5, 1.0, 0.2),
            (1000.0, 0.5, -1.0, 0.2),
            (1000.0, 0.0, 0.0, 0.2),
            (0.0, 0.3, 1.2, 1.0),
        ] {
            let stake = kelly_stake(bankroll, edge, payout, mult);
            assert!(stake >= 0.0);
            assert!(!stake.is_nan());
        }
    }

    #[test]
    fn test_kelly_stake_scales_with_multiplier() {
        let full = kelly_stake(10_000.0, 0.1, 1.0, 1.0);
        let tenth = kelly_stake(10_000.0, 0.1, 1.0, 0.1);
        assert!((tenth * 10.0 - full).abs() < EPS);
    }
}
