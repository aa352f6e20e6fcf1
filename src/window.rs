/// Half-open range `[start, end)` of numbers to test for primality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalRange {
    pub start: u64,
    pub end: u64,
}

impl GlobalRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The only even prime is emitted up front, outside the window.
    pub fn contains_two(&self) -> bool {
        self.start <= 2 && 2 < self.end
    }

    /// First number the checkpoint window covers. The sieve only looks at odd
    /// numbers from 3 upwards.
    pub fn window_start(&self) -> u64 {
        self.start.max(3)
    }
}

/// Loose upper bound on `floor(sqrt(x))` used to decide which candidate
/// factors are eligible once the window reaches `x`.
///
/// Never smaller than the real square root: `x/3 + 1 - sqrt(x)` has its
/// minimum of `0.25` at `x = 2.25`, and the integer division loses less than
/// one. Over-approximation only enqueues extra candidates.
#[inline]
pub fn candidate_bound(x: u64) -> u64 {
    x / 3 + 1
}

/// Smallest odd number `>= x`.
#[inline]
pub fn odd_ceil(x: u64) -> u64 {
    x | 1
}

/// Sub-range of the window, `[lower, upper)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub lower: u64,
    pub upper: u64,
}

impl Span {
    pub fn contains(&self, n: u64) -> bool {
        self.lower <= n && n < self.upper
    }

    /// Odd numbers in the span, ascending.
    pub fn odds(&self) -> impl Iterator<Item = u64> {
        (odd_ceil(self.lower)..self.upper).step_by(2)
    }
}

/// The four checkpoint boundaries, oldest first.
///
/// ```text
///   b0 ........ b1 ........ b2 ........ b3
///   | finalize  |  verify   |   mark    |
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointWindow {
    bounds: [u64; 4],
    end: u64,
    increment: u64,
}

impl CheckpointWindow {
    /// Collapsed window with every boundary at `at`.
    pub fn new(at: u64, end: u64, increment: u64) -> Self {
        let at = at.min(end);
        Self {
            bounds: [at; 4],
            end,
            increment: increment.max(1),
        }
    }

    /// Shift every boundary one slot older and push a new newest boundary,
    /// `increment` past the old one, rounded up to odd and clamped to `end`.
    pub fn advance(&mut self) {
        let next = odd_ceil(self.bounds[3].saturating_add(self.increment)).min(self.end);
        self.bounds.rotate_left(1);
        self.bounds[3] = next;
    }

    pub fn bounds(&self) -> [u64; 4] {
        self.bounds
    }

    pub fn finalize(&self) -> Span {
        Span {
            lower: self.bounds[0],
            upper: self.bounds[1],
        }
    }

    pub fn verify(&self) -> Span {
        Span {
            lower: self.bounds[1],
            upper: self.bounds[2],
        }
    }

    pub fn mark(&self) -> Span {
        Span {
            lower: self.bounds[2],
            upper: self.bounds[3],
        }
    }

    /// The pipeline is finished once nothing is left to verify past `end`.
    pub fn is_done(&self) -> bool {
        self.bounds[2] == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isqrt(x: u64) -> u64 {
        x.isqrt()
    }

    fn smallest_factor(x: u64) -> Option<u64> {
        (3..=isqrt(x)).step_by(2).find(|d| x % d == 0)
    }

    #[test]
    fn test_candidate_bound_small_values() {
        for x in 0..100_000u64 {
            assert!(
                candidate_bound(x) >= isqrt(x),
                "bound({}) = {} < isqrt = {}",
                x,
                candidate_bound(x),
                isqrt(x)
            );
        }
    }

    #[test]
    fn test_candidate_bound_across_u64_range() {
        // Walk the whole range with a multiplicative stride plus the values
        // around every perfect square along the way
        let mut x: u64 = 1;
        while x < u64::MAX / 2 {
            for probe in [x - 1, x, x + 1] {
                assert!(candidate_bound(probe) >= isqrt(probe), "bound failed at {}", probe);
            }
            let root = isqrt(x);
            let square = root * root;
            assert!(candidate_bound(square) >= root);
            x = x + x / 7 + 1;
        }
        assert!(candidate_bound(u64::MAX) >= isqrt(u64::MAX));
    }

    #[test]
    fn test_candidate_bound_covers_smallest_factor() {
        // Any odd composite below b3 has a prime factor p with 3p <= b3 - 1,
        // which must be strictly below bound(b3) to get enqueued.
        for b3 in 4..600u64 {
            for x in (9..b3).step_by(2) {
                if let Some(p) = smallest_factor(x) {
                    assert!(p < candidate_bound(b3), "factor {} of {} missed at b3 {}", p, x, b3);
                }
            }
        }
    }

    #[test]
    fn test_odd_ceil() {
        assert_eq!(odd_ceil(0), 1);
        assert_eq!(odd_ceil(3), 3);
        assert_eq!(odd_ceil(50), 51);
        assert_eq!(odd_ceil(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_window_advance_rounds_to_odd_and_clamps() {
        let mut window = CheckpointWindow::new(3, 100, 20);
        window.advance();
        assert_eq!(window.bounds(), [3, 3, 3, 23]);
        window.advance();
        assert_eq!(window.bounds(), [3, 3, 23, 43]);
        window.advance();
        assert_eq!(window.bounds(), [3, 23, 43, 63]);
        window.advance();
        window.advance();
        assert_eq!(window.bounds(), [43, 63, 83, 100]);
        assert!(!window.is_done());
        window.advance();
        assert_eq!(window.bounds(), [63, 83, 100, 100]);
        assert!(window.is_done());
    }

    #[test]
    fn test_window_even_start() {
        let mut window = CheckpointWindow::new(50, 60, 20);
        window.advance();
        assert_eq!(window.mark(), Span { lower: 50, upper: 60 });
        assert_eq!(window.mark().odds().collect::<Vec<_>>(), vec![51, 53, 55, 57, 59]);
    }

    #[test]
    fn test_window_saturates_near_u64_max() {
        let mut window = CheckpointWindow::new(u64::MAX - 10, u64::MAX, 1 << 40);
        window.advance();
        assert_eq!(window.mark().upper, u64::MAX);
        window.advance();
        assert!(window.is_done());
    }

    #[test]
    fn test_sub_ranges_are_adjacent() {
        let mut window = CheckpointWindow::new(7, 1_000, 33);
        for _ in 0..10 {
            window.advance();
            assert_eq!(window.finalize().upper, window.verify().lower);
            assert_eq!(window.verify().upper, window.mark().lower);
        }
    }

    #[test]
    fn test_global_range_two() {
        assert!(GlobalRange::new(0, 3).contains_two());
        assert!(GlobalRange::new(2, 3).contains_two());
        assert!(!GlobalRange::new(0, 2).contains_two());
        assert!(!GlobalRange::new(3, 100).contains_two());
        assert_eq!(GlobalRange::new(1, 100).window_start(), 3);
        assert_eq!(GlobalRange::new(60, 50).window_start(), 60);
    }
}
