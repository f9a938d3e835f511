use std::collections::VecDeque;
use std::time::Duration;

/// Mean of the last `window` samples.
#[derive(Debug, Clone)]
pub(crate) struct RunningAverage {
    window: usize,
    samples: VecDeque<Duration>,
    sum: Duration,
}

impl RunningAverage {
    pub(crate) fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            sum: Duration::ZERO,
        }
    }

    pub(crate) fn add(&mut self, sample: Duration) {
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum = self.sum.saturating_sub(old);
            }
        }
        self.samples.push_back(sample);
        self.sum = self.sum.saturating_add(sample);
    }

    /// `None` until the first sample.
    pub(crate) fn average(&self) -> Option<Duration> {
        let n = u32::try_from(self.samples.len()).ok().filter(|n| *n > 0)?;
        Some(self.sum / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_average() {
        assert_eq!(RunningAverage::new(3).average(), None);
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut avg = RunningAverage::new(2);
        avg.add(Duration::from_millis(100));
        avg.add(Duration::from_millis(200));
        assert_eq!(avg.average(), Some(Duration::from_millis(150)));
        avg.add(Duration::from_millis(400));
        assert_eq!(avg.average(), Some(Duration::from_millis(300)));
    }
}
