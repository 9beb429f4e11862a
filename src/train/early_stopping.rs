/// Halts once the latest training loss is worse than every loss in the
/// trailing window before it.
///
/// With a window of `k`, the epochs compared against are
/// `history[len - k .. len - 1]`, so only `k - 1` previous losses take part
/// and nothing is decided until more than `k` epochs have completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingWindowStop {
    window: usize,
}

impl TrailingWindowStop {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn should_stop(&self, history: &[f64]) -> bool {
        let len = history.len();
        if len <= self.window || self.window == 0 {
            return false;
        }

        let current = history[len - 1];
        history[len - self.window..len - 1]
            .iter()
            .copied()
            .reduce(f64::max)
            .is_some_and(|worst| worst < current)
    }
}
