//! Range evaluation and transition detection.
//!
//! Both functions are pure: no history, no side effects. The refresh engine
//! feeds them the stored status and the fresh price.

use crate::models::{RangeStatus, TransitionKind};

/// Result of placing a price against a band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub status: RangeStatus,
    /// Distance outside the band as a percentage of the crossed bound, 0 inside.
    pub percent_deviation: f64,
}

/// Place `price` relative to `[min_price, max_price]`, bounds inclusive.
pub fn evaluate(price: f64, min_price: f64, max_price: f64) -> Evaluation {
    if price > max_price {
        Evaluation {
            status: RangeStatus::Above,
            percent_deviation: (price - max_price) / max_price * 100.0,
        }
    } else if price < min_price {
        Evaluation {
            status: RangeStatus::Below,
            percent_deviation: (min_price - price) / min_price * 100.0,
        }
    } else {
        Evaluation {
            status: RangeStatus::InRange,
            percent_deviation: 0.0,
        }
    }
}

/// Classify a status change. `None` means no notifiable crossing.
///
/// Leaving `Pending` never counts: an alert created inside its band is not news.
pub fn detect_transition(previous: RangeStatus, current: RangeStatus) -> Option<TransitionKind> {
    match (previous, current) {
        (RangeStatus::Pending, _) => None,
        (RangeStatus::InRange, RangeStatus::InRange) => None,
        (_, RangeStatus::InRange) => Some(TransitionKind::EnteredRange),
        (RangeStatus::InRange, _) => Some(TransitionKind::ExitedRange),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_inclusive_bounds() {
        for price in [100.0, 105.0, 110.0] {
            let eval = evaluate(price, 100.0, 110.0);
            assert_eq!(eval.status, RangeStatus::InRange);
            assert_eq!(eval.percent_deviation, 0.0);
        }
    }

    #[test]
    fn test_above_deviation() {
        let eval = evaluate(115.0, 100.0, 110.0);
        assert_eq!(eval.status, RangeStatus::Above);
        assert!((eval.percent_deviation - 4.545454).abs() < 1e-4);
    }

    #[test]
    fn test_below_deviation() {
        let eval = evaluate(90.0, 100.0, 110.0);
        assert_eq!(eval.status, RangeStatus::Below);
        assert!((eval.percent_deviation - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_deviation_zero_iff_in_range() {
        let (min, max) = (10.0, 20.0);
        let mut price = 0.5;
        while price < 40.0 {
            let eval = evaluate(price, min, max);
            assert_ne!(eval.status, RangeStatus::Pending);
            assert_eq!(
                eval.percent_deviation == 0.0,
                eval.status == RangeStatus::InRange,
                "price {price}"
            );
            price += 0.25;
        }
    }

    #[test]
    fn test_pending_never_transitions() {
        for status in [RangeStatus::Below, RangeStatus::InRange, RangeStatus::Above] {
            assert_eq!(detect_transition(RangeStatus::Pending, status), None);
        }
    }

    #[test]
    fn test_enter_and_exit() {
        assert_eq!(
            detect_transition(RangeStatus::Below, RangeStatus::InRange),
            Some(TransitionKind::EnteredRange)
        );
        assert_eq!(
            detect_transition(RangeStatus::Above, RangeStatus::InRange),
            Some(TransitionKind::EnteredRange)
        );
        assert_eq!(
            detect_transition(RangeStatus::InRange, RangeStatus::Above),
            Some(TransitionKind::ExitedRange)
        );
        assert_eq!(
            detect_transition(RangeStatus::InRange, RangeStatus::Below),
            Some(TransitionKind::ExitedRange)
        );
    }

    #[test]
    fn test_jump_across_band_is_silent() {
        assert_eq!(detect_transition(RangeStatus::Below, RangeStatus::Above), None);
        assert_eq!(detect_transition(RangeStatus::Above, RangeStatus::Below), None);
        assert_eq!(detect_transition(RangeStatus::InRange, RangeStatus::InRange), None);
        assert_eq!(detect_transition(RangeStatus::Below, RangeStatus::Below), None);
    }
}
