//! The per-thread append-only event log.

use crate::event::Event;

/// Capacity of the first chunk a thread allocates.
const FIRST_CHUNK_CAPACITY: usize = 256;

/// Chunk capacities double until they reach this cap.
const MAX_CHUNK_CAPACITY: usize = 65_536;

/// A growable log of events owned by exactly one thread.
///
/// The backing store is a list of chunks whose capacities double up to a cap,
/// so an append is a pointer bump into the current chunk with an occasional
/// chunk allocation. Existing events are never moved: there is no
/// reallocate-and-copy, which keeps the worst-case append cost bounded.
///
/// Draining takes the whole chunk list with a pointer swap, leaving the
/// buffer empty but ready to record again; the next append allocates a fresh
/// first chunk.
#[derive(Debug, Default)]
pub(crate) struct EventBuffer {
    chunks: Vec<Vec<Event>>,
}

impl EventBuffer {
    pub(crate) fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Appends one event. Amortized cost is a bounds check and a write.
    pub(crate) fn append(&mut self, event: Event) {
        if self
            .chunks
            .last()
            .is_none_or(|chunk| chunk.len() == chunk.capacity())
        {
            self.grow();
        }

        self.chunks
            .last_mut()
            .expect("grow() always leaves a chunk with spare capacity")
            .push(event);
    }

    /// Takes every recorded event, leaving the buffer empty.
    ///
    /// Returns the raw chunk list so the (brief) critical section in the
    /// caller is a pointer swap; flattening happens outside any lock.
    pub(crate) fn take_chunks(&mut self) -> Vec<Vec<Event>> {
        std::mem::take(&mut self.chunks)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    #[cold]
    fn grow(&mut self) {
        let capacity = self
            .chunks
            .last()
            .map_or(FIRST_CHUNK_CAPACITY, |chunk| {
                chunk.capacity().saturating_mul(2).min(MAX_CHUNK_CAPACITY)
            });

        self.chunks.push(Vec::with_capacity(capacity));
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::site::CallSiteId;

    fn event(nanos: u64) -> Event {
        Event::begin(CallSiteId::new(0), Timestamp::from_nanos(nanos))
    }

    #[test]
    fn appends_preserve_order_across_chunks() {
        let mut buffer = EventBuffer::new();

        let count = FIRST_CHUNK_CAPACITY * 3 + 17;
        for i in 0..count {
            buffer.append(event(i as u64));
        }
        assert_eq!(buffer.len(), count);

        let flattened: Vec<Event> = buffer.take_chunks().into_iter().flatten().collect();
        assert_eq!(flattened.len(), count);
        for (i, recorded) in flattened.iter().enumerate() {
            assert_eq!(recorded.timestamp.as_nanos(), i as u64);
        }
    }

    #[test]
    fn chunk_capacities_double_up_to_the_cap() {
        let mut buffer = EventBuffer::new();

        for i in 0..(MAX_CHUNK_CAPACITY * 4) {
            buffer.append(event(i as u64));
        }

        let capacities: Vec<usize> = buffer.chunks.iter().map(Vec::capacity).collect();
        assert_eq!(capacities.first().copied(), Some(FIRST_CHUNK_CAPACITY));
        for window in capacities.windows(2) {
            assert!(window[1] == window[0] * 2 || window[1] == MAX_CHUNK_CAPACITY);
        }
        assert!(capacities.iter().all(|&cap| cap <= MAX_CHUNK_CAPACITY));
    }

    #[test]
    fn take_leaves_the_buffer_reusable() {
        let mut buffer = EventBuffer::new();
        buffer.append(event(1));

        let taken = buffer.take_chunks();
        assert_eq!(taken.iter().map(Vec::len).sum::<usize>(), 1);
        assert_eq!(buffer.len(), 0);

        buffer.append(event(2));
        assert_eq!(buffer.len(), 1);
    }
}
