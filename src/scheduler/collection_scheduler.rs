use crate::util::constants::STAT_SAMPLE_WINDOW_SIZE;
use crate::util::options::ConcurrentAlgorithm;
use std::time::{Duration, Instant};

/// Measurements of one collection cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CollectionSample {
    pub objects_traced: usize,
    pub trace_time: Duration,
    pub bytes_freed: usize,
    /// Time the mutators ran between the end of the previous cycle and the start of this one.
    pub mutator_time: Duration,
}

struct SchedulerState {
    window: [CollectionSample; STAT_SAMPLE_WINDOW_SIZE],
    next: usize,
    num_samples: usize,
    /// When the last cycle finished. Mutator time is measured from here.
    last_cycle_end: Instant,
    delay_to_start_mark: Duration,
}

/// Decides when the concurrent mark-sweep plan should start its next concurrent mark.
///
/// The scheduler keeps a window of the last few cycles. From the window it projects how long
/// the mutators can run before free memory is exhausted, and how long a concurrent mark will
/// take. If the mark is expected to finish in time, its start is delayed by part of the
/// slack; otherwise marking starts immediately.
pub struct CollectionScheduler {
    algorithm: ConcurrentAlgorithm,
    state: spin::Mutex<SchedulerState>,
}

/// Share of the slack to wait for with a snapshot-at-the-beginning mark.
const SATB_DELAY_FACTOR: f64 = 0.65;
/// Share of the last mutator period to wait for with a mostly concurrent mark.
const MOSTLY_CONCURRENT_DELAY_FACTOR: f64 = 0.6;

impl CollectionScheduler {
    pub fn new(algorithm: ConcurrentAlgorithm) -> Self {
        CollectionScheduler {
            algorithm,
            state: spin::Mutex::new(SchedulerState {
                window: [CollectionSample::default(); STAT_SAMPLE_WINDOW_SIZE],
                next: 0,
                num_samples: 0,
                last_cycle_end: Instant::now(),
                delay_to_start_mark: Duration::ZERO,
            }),
        }
    }

    /// Mutator time since the end of the last cycle.
    pub fn mutator_time(&self) -> Duration {
        self.state.lock().last_cycle_end.elapsed()
    }

    pub fn num_samples(&self) -> usize {
        self.state.lock().num_samples
    }

    pub fn delay_to_start_mark(&self) -> Duration {
        self.state.lock().delay_to_start_mark
    }

    /// Record a finished cycle and recompute the delay for the next one. `free_bytes` is the
    /// free memory left after the cycle and `live_objects` the number of objects it found live.
    pub fn record_cycle(&self, sample: CollectionSample, free_bytes: usize, live_objects: usize) {
        let mut state = self.state.lock();
        let next = state.next;
        state.window[next] = sample;
        state.next = (next + 1) % STAT_SAMPLE_WINDOW_SIZE;
        state.num_samples = (state.num_samples + 1).min(STAT_SAMPLE_WINDOW_SIZE);
        state.last_cycle_end = Instant::now();

        let samples = &state.window[..state.num_samples];
        let delay = compute_delay(self.algorithm, samples, sample, free_bytes, live_objects);
        debug!(
            "Scheduler: next concurrent mark starts {:?} after mutators resume",
            delay
        );
        state.delay_to_start_mark = delay;
    }

    /// Whether the next concurrent mark should start now. Without any samples, marking starts
    /// once half of the space is in use.
    pub fn should_start_mark(&self, used_bytes: usize, total_bytes: usize) -> bool {
        let state = self.state.lock();
        if state.num_samples == 0 {
            return used_bytes * 2 >= total_bytes;
        }
        state.last_cycle_end.elapsed() >= state.delay_to_start_mark
    }
}

fn rate(amount: f64, time: Duration) -> Option<f64> {
    let secs = time.as_secs_f64();
    if secs > 0.0 && amount > 0.0 {
        Some(amount / secs)
    } else {
        None
    }
}

/// The delay before starting the next concurrent mark.
pub(crate) fn compute_delay(
    algorithm: ConcurrentAlgorithm,
    samples: &[CollectionSample],
    last: CollectionSample,
    free_bytes: usize,
    live_objects: usize,
) -> Duration {
    let n = samples.len().max(1) as f64;
    let objects: f64 = samples.iter().map(|s| s.objects_traced as f64).sum::<f64>() / n;
    let trace_time = samples.iter().map(|s| s.trace_time).sum::<Duration>().div_f64(n);
    let freed: f64 = samples.iter().map(|s| s.bytes_freed as f64).sum::<f64>() / n;
    let mutator_time = samples.iter().map(|s| s.mutator_time).sum::<Duration>().div_f64(n);

    // Memory freed by a cycle is roughly what the mutators allocate before the next one.
    let (Some(alloc_rate), Some(trace_rate)) = (rate(freed, mutator_time), rate(objects, trace_time))
    else {
        return Duration::ZERO;
    };
    let time_to_exhaust = free_bytes as f64 / alloc_rate;
    let time_to_trace = live_objects as f64 / trace_rate;
    if time_to_trace >= time_to_exhaust {
        return Duration::ZERO;
    }
    match algorithm {
        ConcurrentAlgorithm::MostlyConcurrent => last.mutator_time.mul_f64(MOSTLY_CONCURRENT_DELAY_FACTOR),
        _ => Duration::from_secs_f64((time_to_exhaust - time_to_trace) * SATB_DELAY_FACTOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(objects: usize, trace_ms: u64, freed: usize, mutator_ms: u64) -> CollectionSample {
        CollectionSample {
            objects_traced: objects,
            trace_time: Duration::from_millis(trace_ms),
            bytes_freed: freed,
            mutator_time: Duration::from_millis(mutator_ms),
        }
    }

    #[test]
    fn slack_is_shared_for_satb() {
        // 1 MB per 100 ms allocation rate, 1000 objects per 10 ms trace rate.
        let s = sample(1000, 10, 1 << 20, 100);
        // 2 MB free: 200 ms to exhaust. 1000 live objects: 10 ms to trace.
        let delay = compute_delay(ConcurrentAlgorithm::Satb, &[s], s, 2 << 20, 1000);
        let expected = 0.190 * SATB_DELAY_FACTOR;
        assert!((delay.as_secs_f64() - expected).abs() < 1e-6, "{:?}", delay);
    }

    #[test]
    fn mostly_concurrent_uses_last_mutator_time() {
        let s = sample(1000, 10, 1 << 20, 100);
        let delay = compute_delay(ConcurrentAlgorithm::MostlyConcurrent, &[s], s, 2 << 20, 1000);
        assert_eq!(delay, Duration::from_millis(60));
    }

    #[test]
    fn no_delay_when_trace_cannot_finish_in_time() {
        let s = sample(1000, 100, 1 << 20, 10);
        let delay = compute_delay(ConcurrentAlgorithm::Satb, &[s], s, 1 << 20, 100_000);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn start_at_half_full_without_samples() {
        let scheduler = CollectionScheduler::new(ConcurrentAlgorithm::Satb);
        assert!(!scheduler.should_start_mark(10, 100));
        assert!(scheduler.should_start_mark(50, 100));
        scheduler.record_cycle(sample(1000, 100, 1 << 20, 10), 1 << 20, 100_000);
        assert_eq!(scheduler.num_samples(), 1);
        assert_eq!(scheduler.delay_to_start_mark(), Duration::ZERO);
        assert!(scheduler.should_start_mark(0, 100));
    }
}
