use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::metrics::data::{self, AggregatedMetrics, SumDataPoint};
use crate::metrics::{MetricError, MetricResult, Temporality};

use super::{ComputeAggregation, Number, RunningTotal};

/// What a reader exported last time for one instrument.
#[derive(Clone, Copy, Debug)]
struct Checkpoint<T> {
    total: T,
    time: SystemTime,
}

/// Turns an instrument's running total into sum data points for one reader.
///
/// Cumulative collection reports the running total as is. Delta collection
/// reports the change since this reader's previous collection and moves the
/// checkpoint forward in the same step, so the deltas a reader emits always
/// add up to the running total at its latest collection.
pub(crate) struct Sum<T: Number> {
    total: Arc<RunningTotal<T>>,
    temporality: Temporality,
    monotonic: bool,
    last: Mutex<Option<Checkpoint<T>>>,
}

impl<T: Number> Sum<T> {
    pub(crate) fn new(total: Arc<RunningTotal<T>>, temporality: Temporality, monotonic: bool) -> Self {
        Sum {
            total,
            temporality,
            monotonic,
            last: Mutex::new(None),
        }
    }

    fn cumulative(&self, now: SystemTime) -> SumDataPoint<T> {
        SumDataPoint {
            value: self.total.get(),
            start_time: self.total.start_time(),
            time: now,
        }
    }

    fn delta(&self, now: SystemTime) -> MetricResult<SumDataPoint<T>> {
        let mut last = self.last.lock()?;
        let current = self.total.get();
        let (prior, start_time) = match *last {
            Some(checkpoint) => (checkpoint.total, checkpoint.time),
            None => (T::default(), self.total.start_time()),
        };
        // Committed even when the change cannot be represented, so the next
        // window starts from the current total.
        *last = Some(Checkpoint {
            total: current,
            time: now,
        });

        let value = current.try_sub(prior).ok_or_else(|| {
            MetricError::Other(format!(
                "change from {prior} to {current} is out of range for a delta"
            ))
        })?;
        Ok(SumDataPoint {
            value,
            start_time,
            time: now,
        })
    }
}

impl<T: Number> ComputeAggregation for Sum<T> {
    fn call(&self, now: SystemTime) -> MetricResult<AggregatedMetrics> {
        let data_point = match self.temporality {
            Temporality::Cumulative => self.cumulative(now),
            Temporality::Delta => self.delta(now)?,
        };

        Ok(T::into_aggregated(data::Sum {
            data_point,
            temporality: self.temporality,
            is_monotonic: self.monotonic,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn value(data: AggregatedMetrics) -> u64 {
        match data {
            AggregatedMetrics::U64(sum) => sum.data_point.value,
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn cumulative_reports_running_total() {
        let total = Arc::new(RunningTotal::<u64>::new());
        let sum = Sum::new(total.clone(), Temporality::Cumulative, true);

        total.add(5).unwrap();
        assert_eq!(value(sum.call(SystemTime::now()).unwrap()), 5);
        total.add(20).unwrap();
        assert_eq!(value(sum.call(SystemTime::now()).unwrap()), 25);
    }

    #[test]
    fn delta_reports_change_since_previous_collection() {
        let total = Arc::new(RunningTotal::<u64>::new());
        let sum = Sum::new(total.clone(), Temporality::Delta, true);

        total.add(5).unwrap();
        assert_eq!(value(sum.call(SystemTime::now()).unwrap()), 5);
        total.add(20).unwrap();
        assert_eq!(value(sum.call(SystemTime::now()).unwrap()), 20);
    }

    #[rstest]
    #[case(Temporality::Cumulative, 7)]
    #[case(Temporality::Delta, 0)]
    fn unchanged_total_is_still_reported(#[case] temporality: Temporality, #[case] expected: u64) {
        let total = Arc::new(RunningTotal::<u64>::new());
        let sum = Sum::new(total.clone(), temporality, true);

        total.add(7).unwrap();
        sum.call(SystemTime::now()).unwrap();
        assert_eq!(value(sum.call(SystemTime::now()).unwrap()), expected);
    }

    #[test]
    fn deltas_telescope_to_the_cumulative_total() {
        let total = Arc::new(RunningTotal::<u64>::new());
        let delta = Sum::new(total.clone(), Temporality::Delta, true);
        let cumulative = Sum::new(total.clone(), Temporality::Cumulative, true);

        let increments: [&[u64]; 5] = [&[1, 2, 3], &[], &[10], &[4, 4, 4, 4], &[100]];
        let mut delta_sum = 0;
        for tick in increments {
            for inc in tick {
                total.add(*inc).unwrap();
            }
            let now = SystemTime::now();
            delta_sum += value(delta.call(now).unwrap());
            assert_eq!(delta_sum, value(cumulative.call(now).unwrap()));
        }
    }

    #[test]
    fn overflowing_add_does_not_disturb_deltas() {
        let total = Arc::new(RunningTotal::<u64>::new());
        let delta = Sum::new(total.clone(), Temporality::Delta, true);

        total.add(u64::MAX).unwrap();
        assert!(total.add(2).is_err());
        assert_eq!(value(delta.call(SystemTime::now()).unwrap()), u64::MAX);
        assert_eq!(value(delta.call(SystemTime::now()).unwrap()), 0);
    }

    #[test]
    fn unrepresentable_delta_is_an_error_not_a_panic() {
        let total = Arc::new(RunningTotal::<i64>::new());
        let sum = Sum::new(total.clone(), Temporality::Delta, false);

        total.add(i64::MIN).unwrap();
        sum.call(SystemTime::now()).unwrap();
        total.add(i64::MAX).unwrap();
        total.add(i64::MAX).unwrap();
        assert!(matches!(
            sum.call(SystemTime::now()),
            Err(MetricError::Other(_))
        ));

        // The checkpoint moved on, so later windows are reported normally.
        total.add(-3).unwrap();
        match sum.call(SystemTime::now()).unwrap() {
            AggregatedMetrics::I64(sum) => assert_eq!(sum.data_point.value, -3),
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn windows_follow_temporality() {
        let total = Arc::new(RunningTotal::<u64>::new());
        let delta = Sum::new(total.clone(), Temporality::Delta, true);
        let cumulative = Sum::new(total.clone(), Temporality::Cumulative, true);

        let first = total.start_time() + Duration::from_secs(5);
        let second = first + Duration::from_secs(5);

        assert_eq!(delta.call(first).unwrap().window(), (total.start_time(), first));
        assert_eq!(delta.call(second).unwrap().window(), (first, second));
        assert_eq!(
            cumulative.call(second).unwrap().window(),
            (total.start_time(), second)
        );
    }

    #[test]
    fn non_monotonic_deltas_can_be_negative() {
        let total = Arc::new(RunningTotal::<i64>::new());
        let sum = Sum::new(total.clone(), Temporality::Delta, false);

        total.add(10).unwrap();
        sum.call(SystemTime::now()).unwrap();
        total.add(-15).unwrap();
        match sum.call(SystemTime::now()).unwrap() {
            AggregatedMetrics::I64(sum) => {
                assert_eq!(sum.data_point.value, -15);
                assert!(!sum.is_monotonic);
                assert_eq!(sum.temporality, Temporality::Delta);
            }
            other => panic!("unexpected data {other:?}"),
        }
    }
}
