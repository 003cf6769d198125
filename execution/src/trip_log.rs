use floorgate_types::TripRecord;

/// Append-only history of interlock trips.
#[derive(Clone, Debug, Default)]
pub struct TripLog {
    records: Vec<TripRecord>,
}

impl TripLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: TripRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TripRecord> {
        self.records.last()
    }

    /// The most recent `count` records, oldest first.
    pub fn recent(&self, count: usize) -> &[TripRecord] {
        let start = self.records.len().saturating_sub(count);
        &self.records[start..]
    }

    /// Mean trip duration over the last `window` records, or `default` when
    /// the log is empty.
    pub fn average_duration_ms(&self, window: usize, default: f64) -> f64 {
        let recent = self.recent(window);
        if recent.is_empty() {
            return default;
        }
        recent.iter().map(|record| record.trip_duration_ms).sum::<f64>() / recent.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use floorgate_types::FaultKind;

    fn record(cycle_index: u64, trip_duration_ms: f64) -> TripRecord {
        TripRecord {
            fault: FaultKind::Thermal,
            trip_duration_ms,
            timestamp: Utc::now(),
            cycle_index,
        }
    }

    #[test]
    fn empty_log_uses_default_average() {
        let log = TripLog::new();
        assert!(log.is_empty());
        assert!(log.last().is_none());
        assert!(log.recent(5).is_empty());
        assert_eq!(log.average_duration_ms(10, 0.2), 0.2);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut log = TripLog::new();
        for i in 1..=8 {
            log.record(record(i, 0.5));
        }
        let tail: Vec<u64> = log.recent(5).iter().map(|r| r.cycle_index).collect();
        assert_eq!(tail, vec![4, 5, 6, 7, 8]);
        assert_eq!(log.recent(50).len(), 8);
        assert_eq!(log.last().map(|r| r.cycle_index), Some(8));
    }

    #[test]
    fn average_covers_at_most_window() {
        let mut log = TripLog::new();
        log.record(record(1, 0.8));
        log.record(record(2, 0.4));
        assert!((log.average_duration_ms(10, 0.2) - 0.6).abs() < 1e-12);

        for i in 3..=12 {
            log.record(record(i, 0.3));
        }
        // The two early records fall outside the window of ten.
        assert!((log.average_duration_ms(10, 0.2) - 0.3).abs() < 1e-12);
    }
}
