//! Sliding-window history of per-second samples.
//!
//! The supervisor keeps one window for the data rate and one for jitter.
//! Each window remembers the last [`WINDOW_SECS`] samples in a circular
//! buffer for the trailing average, plus lifetime sum/min/max.

/// Depth of the circular history, in one-second samples.
pub const WINDOW_SECS: usize = 10;

/// Fixed-depth circular sample history with lifetime aggregates.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    current: u64,
    samples: [u64; WINDOW_SECS],
    filled: usize,
    cursor: usize,
    window_sum: u64,
    lifetime_total: u64,
    min: u64,
    max: u64,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self {
            current: 0,
            samples: [0; WINDOW_SECS],
            filled: 0,
            cursor: 0,
            window_sum: 0,
            lifetime_total: 0,
            min: 0,
            max: 0,
        }
    }

    /// Records one per-second sample: overwrites the oldest slot, advances
    /// the cursor, and refreshes the windowed sum and lifetime aggregates.
    pub fn push(&mut self, sample: u64) {
        if self.filled == 0 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }

        self.current = sample;
        self.lifetime_total += sample;

        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % WINDOW_SECS;
        if self.filled < WINDOW_SECS {
            self.filled += 1;
        }

        self.window_sum = self.samples[..self.filled].iter().sum();
    }

    /// The most recently pushed sample.
    pub fn last(&self) -> u64 {
        self.current
    }

    /// Trailing average over the filled slots. Divides by the fill level,
    /// not the window depth, so a warming-up window is not diluted.
    pub fn windowed_avg(&self) -> u64 {
        if self.filled == 0 {
            0
        } else {
            self.window_sum / self.filled as u64
        }
    }

    pub fn lifetime_total(&self) -> u64 {
        self.lifetime_total
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zeroes() {
        let w = SlidingWindow::new();
        assert_eq!(w.last(), 0);
        assert_eq!(w.windowed_avg(), 0);
        assert_eq!(w.lifetime_total(), 0);
    }

    #[test]
    fn average_divides_by_fill_level_while_warming_up() {
        let mut w = SlidingWindow::new();
        w.push(30);
        assert_eq!(w.windowed_avg(), 30);
        w.push(10);
        assert_eq!(w.windowed_avg(), 20);
        w.push(20);
        assert_eq!(w.windowed_avg(), 20);
    }

    #[test]
    fn twelve_samples_evict_the_oldest_two() {
        let mut w = SlidingWindow::new();
        for s in 1..=12u64 {
            w.push(s);
        }
        // Only samples 3..=12 remain in the window.
        assert_eq!(w.windowed_avg(), (3..=12).sum::<u64>() / 10);
        assert_eq!(w.last(), 12);
        assert_eq!(w.lifetime_total(), (1..=12).sum::<u64>());
    }

    #[test]
    fn min_and_max_track_lifetime_not_window() {
        let mut w = SlidingWindow::new();
        w.push(5);
        assert_eq!(w.min(), 5);
        assert_eq!(w.max(), 5);

        for s in [100, 2, 50, 7, 7, 7, 7, 7, 7, 7, 7, 7] {
            w.push(s);
        }
        // 100 and 2 have left the window but stay as lifetime extremes.
        assert_eq!(w.min(), 2);
        assert_eq!(w.max(), 100);
    }

    #[test]
    fn fill_level_caps_at_window_depth() {
        let mut w = SlidingWindow::new();
        for _ in 0..25 {
            w.push(4);
        }
        assert_eq!(w.windowed_avg(), 4);
        assert_eq!(w.lifetime_total(), 100);
    }
}
