//! Progress tracking for a single copy or verify pass.

use serde::{Deserialize, Serialize};

/// Percentages that produce a log milestone.
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Progress of one pass over the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassProgress {
    /// Bytes processed so far.
    pub bytes_done: u64,
    /// Total bytes to process.
    pub bytes_total: u64,
    /// Last reported percentage.
    pub percent: u8,
}

/// What changed after recording a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressStep {
    /// The new percentage, when it differs from the previous one.
    pub changed_to: Option<u8>,
    /// Milestones crossed by this step, in ascending order.
    pub milestones: Vec<u8>,
}

impl PassProgress {
    /// Create a tracker for a pass of `bytes_total` bytes.
    pub fn new(bytes_total: u64) -> Self {
        Self {
            bytes_done: 0,
            bytes_total,
            percent: 0,
        }
    }

    /// `floor(100 * done / total)`; an empty pass counts as complete.
    pub fn percentage(done: u64, total: u64) -> u8 {
        if total == 0 {
            return 100;
        }
        let pct = (u128::from(done.min(total)) * 100) / u128::from(total);
        pct as u8
    }

    /// Whether every byte has been processed.
    pub fn is_complete(&self) -> bool {
        self.bytes_done >= self.bytes_total
    }

    /// Record `bytes` more processed bytes.
    pub fn advance(&mut self, bytes: u64) -> ProgressStep {
        self.bytes_done = self.bytes_done.saturating_add(bytes).min(self.bytes_total);
        self.update()
    }

    /// Mark the pass complete. Used for empty passes that have no chunks.
    pub fn finish(&mut self) -> ProgressStep {
        self.bytes_done = self.bytes_total;
        self.update()
    }

    fn update(&mut self) -> ProgressStep {
        let next = Self::percentage(self.bytes_done, self.bytes_total);
        if next <= self.percent {
            return ProgressStep::default();
        }

        let previous = self.percent;
        self.percent = next;
        let milestones = MILESTONES
            .iter()
            .copied()
            .filter(|m| *m > previous && *m <= next)
            .collect();

        ProgressStep {
            changed_to: Some(next),
            milestones,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_floors() {
        assert_eq!(PassProgress::percentage(0, 1000), 0);
        assert_eq!(PassProgress::percentage(999, 1000), 99);
        assert_eq!(PassProgress::percentage(1000, 1000), 100);
        assert_eq!(PassProgress::percentage(1, 3), 33);
        assert_eq!(PassProgress::percentage(0, 0), 100);
    }

    #[test]
    fn test_percentage_large_devices() {
        let total = 8u64 * 1024 * 1024 * 1024 * 1024;
        assert_eq!(PassProgress::percentage(total / 2, total), 50);
    }

    #[test]
    fn test_advance_reports_only_changes() {
        let mut progress = PassProgress::new(1000);
        let step = progress.advance(5);
        assert_eq!(step.changed_to, None);

        let step = progress.advance(5);
        assert_eq!(step.changed_to, Some(1));
        assert!(step.milestones.is_empty());
    }

    #[test]
    fn test_advance_crosses_multiple_milestones() {
        let mut progress = PassProgress::new(100);
        let step = progress.advance(60);
        assert_eq!(step.changed_to, Some(60));
        assert_eq!(step.milestones, vec![25, 50]);

        let step = progress.advance(40);
        assert_eq!(step.changed_to, Some(100));
        assert_eq!(step.milestones, vec![75, 100]);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_empty_pass_finishes_at_100() {
        let mut progress = PassProgress::new(0);
        let step = progress.finish();
        assert_eq!(step.changed_to, Some(100));
        assert_eq!(step.milestones, vec![25, 50, 75, 100]);

        assert_eq!(progress.finish(), ProgressStep::default());
    }
}
