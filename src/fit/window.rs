/// Acceptable output sizes around a target, computed once per request.
///
/// `lower <= target <= upper` always holds; `lower` saturates at zero for
/// tolerances above 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceWindow {
    pub target: u64,
    pub lower: u64,
    pub upper: u64,
}

impl ToleranceWindow {
    pub fn new(target: u64, tolerance_percent: f64) -> Self {
        let slack = (target as f64 * tolerance_percent / 100.0).max(0.0);
        let lower = (target as f64 - slack).max(0.0).ceil() as u64;
        let upper = (target as f64 + slack).floor() as u64;
        Self {
            target,
            lower: lower.min(target),
            upper: upper.max(target),
        }
    }

    pub fn contains(&self, size: u64) -> bool {
        (self.lower..=self.upper).contains(&size)
    }

    /// At or below the upper bound. Undershooting is acceptable.
    pub fn admits(&self, size: u64) -> bool {
        size <= self.upper
    }

    /// At or below the target itself; the quality search only keeps these.
    pub fn is_feasible(&self, size: u64) -> bool {
        size <= self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_percent_of_20_kib() {
        let window = ToleranceWindow::new(20 * 1024, 5.0);
        assert_eq!(window.lower, 19456);
        assert_eq!(window.upper, 21504);
    }

    #[test]
    fn bounds_bracket_target() {
        for (target, pct) in [(1, 5.0), (7, 33.3), (1000, 0.01), (999_999, 12.5)] {
            let w = ToleranceWindow::new(target, pct);
            assert!(w.lower <= w.target && w.target <= w.upper, "{w:?}");
        }
    }

    #[test]
    fn huge_tolerance_saturates_lower() {
        let window = ToleranceWindow::new(1000, 250.0);
        assert_eq!(window.lower, 0);
        assert_eq!(window.upper, 3500);
    }

    #[test]
    fn admits_undershoot_but_not_overshoot() {
        let window = ToleranceWindow::new(1000, 10.0);
        assert!(window.admits(10));
        assert!(window.admits(1100));
        assert!(!window.admits(1101));
        assert!(!window.contains(10));
        assert!(window.contains(950));
    }

    #[test]
    fn feasible_means_at_most_target() {
        let window = ToleranceWindow::new(1000, 10.0);
        assert!(window.is_feasible(1000));
        assert!(!window.is_feasible(1001));
    }
}
