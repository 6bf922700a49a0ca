use std::time::Duration;

use crate::types::RequestPriority;

/// Per-priority request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityStats {
    pub requests: u64,
    pub successes: u64,
}

/// Aggregate request metrics. Read-only for consumers; the client records
/// into it and `reset` zeroes it.
#[derive(Debug, Clone, Default)]
pub struct ClientMetrics {
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Sum of completed request durations, for deriving the mean.
    pub total_duration: Duration,
    by_priority: [PriorityStats; 4],
}

impl ClientMetrics {
    pub(crate) fn record_success(&mut self, priority: RequestPriority, duration: Duration) {
        self.total_requests += 1;
        self.total_successes += 1;
        self.total_duration += duration;
        let slot = &mut self.by_priority[priority.index()];
        slot.requests += 1;
        slot.successes += 1;
    }

    pub(crate) fn record_failure(&mut self, priority: RequestPriority, duration: Duration) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.total_duration += duration;
        self.by_priority[priority.index()].requests += 1;
    }

    /// Mean duration across completed requests.
    pub fn mean_duration(&self) -> Duration {
        if self.total_requests == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.total_requests as u32
    }

    pub fn for_priority(&self, priority: RequestPriority) -> PriorityStats {
        self.by_priority[priority.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_split_by_outcome_and_priority() {
        let mut m = ClientMetrics::default();
        m.record_success(RequestPriority::Normal, Duration::from_millis(100));
        m.record_success(RequestPriority::High, Duration::from_millis(300));
        m.record_failure(RequestPriority::Normal, Duration::from_millis(200));

        assert_eq!(m.total_requests, 3);
        assert_eq!(m.total_successes, 2);
        assert_eq!(m.total_failures, 1);
        assert_eq!(m.mean_duration(), Duration::from_millis(200));

        let normal = m.for_priority(RequestPriority::Normal);
        assert_eq!(normal.requests, 2);
        assert_eq!(normal.successes, 1);
        let high = m.for_priority(RequestPriority::High);
        assert_eq!(high.requests, 1);
        assert_eq!(high.successes, 1);
        assert_eq!(m.for_priority(RequestPriority::Low), PriorityStats::default());
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(ClientMetrics::default().mean_duration(), Duration::ZERO);
    }
}
