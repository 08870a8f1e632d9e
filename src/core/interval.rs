//! Closed time intervals over nanosecond timestamps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed interval `[left, right]` of nanosecond timestamps.
///
/// The empty interval is represented as `left > right` (specifically
/// `[u64::MAX, 0]`), which makes [`TimeInterval::union`] a plain min/max with
/// the empty interval as identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub left: u64,
    pub right: u64,
}

impl TimeInterval {
    pub const EMPTY: TimeInterval = TimeInterval {
        left: u64::MAX,
        right: 0,
    };

    pub const INFINITE: TimeInterval = TimeInterval {
        left: 0,
        right: u64::MAX,
    };

    /// Creates `[left, right]`, swapping the bounds if given in reverse.
    pub fn new(left: u64, right: u64) -> Self {
        if left <= right {
            Self { left, right }
        } else {
            Self {
                left: right,
                right: left,
            }
        }
    }

    pub fn point(at: u64) -> Self {
        Self {
            left: at,
            right: at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right
    }

    pub fn contains(&self, t: u64) -> bool {
        !self.is_empty() && self.left <= t && t <= self.right
    }

    pub fn union(&self, other: &TimeInterval) -> TimeInterval {
        TimeInterval {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
        }
    }

    pub fn intersect(&self, other: &TimeInterval) -> TimeInterval {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        if left > right {
            TimeInterval::EMPTY
        } else {
            TimeInterval { left, right }
        }
    }

    /// Widens the interval to include `t`.
    pub fn extend(&mut self, t: u64) {
        self.left = self.left.min(t);
        self.right = self.right.max(t);
    }

    /// Union of all intervals in the iterator; empty for an empty iterator.
    pub fn union_all<'a>(intervals: impl IntoIterator<Item = &'a TimeInterval>) -> TimeInterval {
        intervals
            .into_iter()
            .fold(TimeInterval::EMPTY, |acc, next| acc.union(next))
    }

    /// Span in nanoseconds; zero for the empty interval.
    pub fn span_ns(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.right - self.left
        }
    }
}

impl Default for TimeInterval {
    fn default() -> Self {
        TimeInterval::EMPTY
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("[empty]")
        } else {
            write!(f, "[{}, {}]", self.left, self.right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_union_identity() {
        let a = TimeInterval::new(10, 20);
        assert_eq!(TimeInterval::EMPTY.union(&a), a);
        assert_eq!(a.union(&TimeInterval::EMPTY), a);
        assert!(TimeInterval::EMPTY.union(&TimeInterval::EMPTY).is_empty());
    }

    #[test]
    fn union_takes_outer_bounds() {
        let a = TimeInterval::new(10, 20);
        let b = TimeInterval::new(5, 15);
        assert_eq!(a.union(&b), TimeInterval::new(5, 20));
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = TimeInterval::new(10, 20);
        let b = TimeInterval::new(30, 40);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.intersect(&TimeInterval::INFINITE), a);
    }

    #[test]
    fn contains_respects_closed_bounds() {
        let a = TimeInterval::new(10, 20);
        assert!(a.contains(10));
        assert!(a.contains(20));
        assert!(!a.contains(21));
        assert!(!TimeInterval::EMPTY.contains(0));
    }

    #[test]
    fn new_orders_bounds() {
        assert_eq!(TimeInterval::new(9, 3), TimeInterval::new(3, 9));
    }

    #[test]
    fn extend_from_empty() {
        let mut interval = TimeInterval::EMPTY;
        interval.extend(7);
        interval.extend(3);
        assert_eq!(interval, TimeInterval::new(3, 7));
        assert_eq!(interval.span_ns(), 4);
    }
}
