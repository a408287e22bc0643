//! Overlay truncation intervals.
//!
//! An overlay category claims a slice of its group's auxiliary field on top
//! of whatever background category a cell lands in. To keep the overlay's
//! probability out of the background polygons, the background members of the
//! group are re-expanded by `1 / deltaH` before the rectangles are laid out:
//!
//! ```text
//! sumBG   = Σ prob(background member)
//! deltaH  = sumBG / (sumBG + prob(overlay))
//! width   = 1 − deltaH
//! low     = clamp(center − width / 2, 0, deltaH)
//! high    = low + width
//! ```
//!
//! A cell whose background leaf belongs to the group becomes the overlay
//! category when `low < coordinate ≤ high`.

use crate::rule::OverlayGroup;

/// Minimum combined mass of a group for its overlay interval to open.
pub const OVERLAY_MIN_MASS: f64 = 0.0005;

/// Half-open interval `(low, high]` on an overlay group's auxiliary field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayInterval {
    /// Exclusive lower bound.
    pub low: f64,
    /// Inclusive upper bound.
    pub high: f64,
    /// Background share of the group's combined probability.
    pub delta_h: f64,
}

impl OverlayInterval {
    /// An interval that no coordinate falls into.
    pub fn closed_at(center: f64) -> Self {
        Self {
            low: center,
            high: center,
            delta_h: 1.0,
        }
    }

    /// Whether `coordinate` selects the overlay category.
    #[inline]
    pub fn contains(&self, coordinate: f64) -> bool {
        self.low < coordinate && coordinate <= self.high
    }

    /// Interval length, equal to the overlay's share of the group.
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Re-expand the background members of `group` inside `probabilities`
/// (order-indexed) and return the group's overlay interval.
///
/// Groups whose combined mass is at most [`OVERLAY_MIN_MASS`] are left
/// untouched and get an empty interval.
pub fn resolve_overlay(group: &OverlayGroup, probabilities: &mut [f64]) -> OverlayInterval {
    let sum_bg: f64 = group.background.iter().map(|&c| probabilities[c]).sum();
    let overlay_prob = probabilities[group.overlay];
    let mass = sum_bg + overlay_prob;
    if mass <= OVERLAY_MIN_MASS {
        return OverlayInterval::closed_at(group.center);
    }

    let delta_h = sum_bg / mass;
    if delta_h > 0.0 {
        for &c in &group.background {
            probabilities[c] /= delta_h;
        }
    }

    let width = 1.0 - delta_h;
    let low = (group.center - 0.5 * width).clamp(0.0, delta_h);
    OverlayInterval {
        low,
        high: low + width,
        delta_h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(center: f64) -> OverlayGroup {
        OverlayGroup {
            overlay: 2,
            background: vec![0, 1],
            center,
        }
    }

    #[test]
    fn test_centered_interval() {
        let mut p = [0.4, 0.4, 0.2];
        let iv = resolve_overlay(&group(0.5), &mut p);
        assert!((iv.delta_h - 0.8).abs() < 1e-12);
        assert!((iv.low - 0.4).abs() < 1e-12);
        assert!((iv.high - 0.6).abs() < 1e-12);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
        assert!(iv.contains(0.5));
        assert!(!iv.contains(0.05));
    }

    #[test]
    fn test_interval_shifted_inside_unit_range() {
        let mut p = [0.3, 0.3, 0.4];
        let iv = resolve_overlay(&group(0.95), &mut p);
        // width 0.4 centred at 0.95 would spill past 1.0
        assert!((iv.high - 1.0).abs() < 1e-12, "high={}", iv.high);
        assert!((iv.width() - 0.4).abs() < 1e-12);

        let mut p = [0.3, 0.3, 0.4];
        let iv = resolve_overlay(&group(0.0), &mut p);
        assert_eq!(iv.low, 0.0);
        assert!((iv.high - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_negligible_group_stays_closed() {
        let mut p = [0.0001, 0.0001, 0.0001, 0.9997];
        let before = p;
        let iv = resolve_overlay(&group(0.5), &mut p);
        assert_eq!(p, before);
        assert_eq!(iv.width(), 0.0);
        assert!(!iv.contains(0.5));
    }
}
