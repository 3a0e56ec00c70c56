use crate::midi::{MidiEvent, TimedMidiEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Number of queued events before producers start dropping messages.
const DEFAULT_CAPACITY: usize = 1024;

/// Thread-safe sink for incoming MIDI events.
///
/// Producers push timestamped events from any thread; the audio callback
/// drains the events due in its current sample window. Both sides share a
/// mutex, but every critical section is bounded: the queue never grows past
/// its reserved capacity, so neither `push` nor `drain_into` can allocate or
/// hold the lock for more than a capacity-bounded copy.
pub struct MidiEventCollector {
    /// Sorted by timestamp; capacity is reserved up front.
    queue: Mutex<Vec<(f64, MidiEvent)>>,
    capacity: usize,
    dropped: AtomicUsize,
    epoch: Instant,
}

impl Default for MidiEventCollector {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MidiEventCollector {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            dropped: AtomicUsize::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seconds elapsed on the collector's own monotonic clock. Timestamps
    /// passed to [`push`](Self::push) are interpreted against this clock.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Queues an event, keyed by a timestamp in seconds. Events pushed out of
    /// order are slotted into place so drains always see timestamp order.
    /// When the queue is full the event is dropped and counted, never blocked on.
    pub fn push(&self, event: MidiEvent, timestamp: f64) {
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        if queue.len() >= self.capacity {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let idx = queue.partition_point(|&(time, _)| time <= timestamp);
        queue.insert(idx, (timestamp, event));
    }

    /// Queues an event stamped with the current time.
    pub fn push_now(&self, event: MidiEvent) {
        self.push(event, self.now());
    }

    /// Removes every queued event due before the end of the window starting
    /// at `window_start` and appends it to `out`, converted to a sample
    /// offset in `[0, num_samples)`.
    ///
    /// Late arrivals (timestamp before the window) coalesce to offset 0
    /// rather than being dropped; events at or past the window end stay
    /// queued for a later drain. Offsets come out non-decreasing.
    ///
    /// Callback-only. `out` must have enough spare capacity for the
    /// collector's full queue, so the call never allocates.
    pub fn drain_into(
        &self,
        window_start: f64,
        num_samples: usize,
        sample_rate: f64,
        out: &mut Vec<TimedMidiEvent>,
    ) {
        if num_samples == 0 || sample_rate <= 0.0 {
            return;
        }
        let window_end = window_start + num_samples as f64 / sample_rate;

        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        let due = queue.partition_point(|&(time, _)| time < window_end);
        for &(time, event) in &queue[..due] {
            let offset = ((time - window_start) * sample_rate).round().max(0.0) as u32;
            out.push(TimedMidiEvent {
                time: offset.min(num_samples as u32 - 1),
                event,
            });
        }
        queue.drain(..due);
    }

    /// Discards all queued events (device start).
    pub fn reset(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const RATE: f64 = 44_100.0;

    fn note_on(note: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            note,
            velocity: 100,
        }
    }

    fn drain(collector: &MidiEventCollector, start: f64, samples: usize) -> Vec<TimedMidiEvent> {
        let mut out = Vec::with_capacity(collector.capacity());
        collector.drain_into(start, samples, RATE, &mut out);
        out
    }

    #[test]
    fn test_event_drained_once_at_its_offset() {
        let collector = MidiEventCollector::new();
        collector.push(note_on(60), 100.0 / RATE);

        let first = drain(&collector, 0.0, 512);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].time, 100);
        assert_eq!(first[0].event, note_on(60));

        // Second window must not see it again
        let second = drain(&collector, 512.0 / RATE, 512);
        assert!(second.is_empty());
    }

    #[test]
    fn test_out_of_order_pushes_drain_sorted() {
        let collector = MidiEventCollector::new();
        collector.push(note_on(3), 300.0 / RATE);
        collector.push(note_on(1), 100.0 / RATE);
        collector.push(note_on(2), 200.0 / RATE);

        let events = drain(&collector, 0.0, 512);
        let offsets: Vec<u32> = events.iter().map(|ev| ev.time).collect();
        assert_eq!(offsets, vec![100, 200, 300]);
    }

    #[test]
    fn test_late_arrival_coalesces_to_window_start() {
        let collector = MidiEventCollector::new();
        collector.push(note_on(60), 0.0);

        let events = drain(&collector, 1.0, 512);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 0);
    }

    #[test]
    fn test_future_event_deferred_to_next_window() {
        let collector = MidiEventCollector::new();
        collector.push(note_on(60), 600.0 / RATE);

        assert!(drain(&collector, 0.0, 512).is_empty());

        let events = drain(&collector, 512.0 / RATE, 512);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 88);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let collector = MidiEventCollector::with_capacity(2);
        collector.push(note_on(1), 0.1);
        collector.push(note_on(2), 0.2);
        collector.push(note_on(3), 0.3);

        assert_eq!(collector.dropped_count(), 1);
        assert_eq!(drain(&collector, 0.0, 512).len(), 2);
    }

    #[test]
    fn test_reset_discards_queue() {
        let collector = MidiEventCollector::new();
        collector.push_now(note_on(60));
        collector.reset();
        assert!(drain(&collector, 0.0, 512).is_empty());
    }
}
