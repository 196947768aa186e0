//! Citizen level table and evaluator
//!
//! A user's level is always derived from accumulated points against this
//! static table; it is never stored, so stored points and displayed tier
//! cannot drift apart. Ranges are contiguous and non-overlapping and
//! collectively cover [0, ∞).

use serde::Serialize;

/// One tier in the citizen level table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Level {
    /// Inclusive lower bound in points
    pub min_points: i64,
    /// Inclusive upper bound; `None` for the open-ended top tier
    pub max_points: Option<i64>,
    /// Tier name
    pub name: &'static str,
    /// Display icon
    pub icon: &'static str,
}

/// The static level table, ordered low to high
pub const LEVELS: &[Level] = &[
    Level { min_points: 0, max_points: Some(9), name: "Seedling", icon: "🌱" },
    Level { min_points: 10, max_points: Some(49), name: "Helper", icon: "🤝" },
    Level { min_points: 50, max_points: Some(99), name: "Contributor", icon: "⭐" },
    Level { min_points: 100, max_points: Some(299), name: "Advocate", icon: "🔥" },
    Level { min_points: 300, max_points: Some(999), name: "Champion", icon: "🏆" },
    Level { min_points: 1000, max_points: None, name: "Guardian", icon: "👑" },
];

/// Result of comparing the level before and after a points change
#[derive(Debug, Clone, Copy)]
pub struct LevelChange {
    pub previous: Level,
    pub new: Level,
    pub leveled_up: bool,
}

/// Look up the tier for a point total (first matching range, low to high).
/// Negative totals clamp to the bottom tier; points are monotonically
/// non-decreasing so this only guards arithmetic mistakes upstream.
pub fn level_for_points(points: i64) -> Level {
    let points = points.max(0);
    for level in LEVELS {
        let above_min = points >= level.min_points;
        let below_max = level.max_points.map(|max| points <= max).unwrap_or(true);
        if above_min && below_max {
            return *level;
        }
    }
    // Unreachable while the table covers [0, ∞)
    LEVELS[LEVELS.len() - 1]
}

/// Pure evaluator: tier before, tier after, and whether the boundary was
/// crossed. `evaluate(p, p)` never reports a level-up.
pub fn evaluate(previous_points: i64, new_points: i64) -> LevelChange {
    let previous = level_for_points(previous_points);
    let new = level_for_points(new_points);
    LevelChange {
        previous,
        new,
        leveled_up: previous.name != new.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_contiguous_and_covers_zero_to_infinity() {
        assert_eq!(LEVELS[0].min_points, 0);
        for pair in LEVELS.windows(2) {
            let max = pair[0].max_points.expect("only the top tier is open-ended");
            assert_eq!(max + 1, pair[1].min_points);
        }
        assert!(LEVELS.last().unwrap().max_points.is_none());
    }

    #[test]
    fn every_point_total_matches_exactly_one_tier() {
        for p in 0..=2000 {
            let matches = LEVELS
                .iter()
                .filter(|l| {
                    p >= l.min_points && l.max_points.map(|m| p <= m).unwrap_or(true)
                })
                .count();
            assert_eq!(matches, 1, "point total {} matched {} tiers", p, matches);
        }
    }

    #[test]
    fn tiering_is_monotonic() {
        let index_of = |points: i64| {
            let level = level_for_points(points);
            LEVELS.iter().position(|l| l.name == level.name).unwrap()
        };
        let mut last = 0;
        for p in 0..=2000 {
            let idx = index_of(p);
            assert!(idx >= last, "tier regressed at {} points", p);
            last = idx;
        }
    }

    #[test]
    fn evaluate_same_points_never_levels_up() {
        for p in [0, 9, 10, 49, 50, 999, 1000, 5000] {
            assert!(!evaluate(p, p).leveled_up);
        }
    }

    #[test]
    fn crossing_a_boundary_levels_up() {
        let change = evaluate(9, 10);
        assert!(change.leveled_up);
        assert_eq!(change.previous.name, "Seedling");
        assert_eq!(change.new.name, "Helper");
    }

    #[test]
    fn staying_inside_a_band_does_not_level_up() {
        let change = evaluate(10, 49);
        assert!(!change.leveled_up);
        assert_eq!(change.new.name, "Helper");
    }

    #[test]
    fn negative_points_clamp_to_bottom_tier() {
        assert_eq!(level_for_points(-5).name, "Seedling");
    }
}
