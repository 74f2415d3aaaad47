//! The process-wide directory of per-thread event buffers.

use std::num::NonZero;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::buffer::EventBuffer;
use crate::event::{Event, ThreadId};
use crate::recorded::{RecordedEvents, ThreadEvents};
use crate::site::{CallSiteId, CallSiteTable};

/// The one registry shared by every recorder in the process.
///
/// Lazily constructed on first use: the first scope entered anywhere, or the
/// first drain, whichever comes first. It is never torn down; call-site and
/// thread ids stay valid for the process lifetime.
pub(crate) fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// Directory of per-thread buffers plus the call-site table.
///
/// The directory mutex guards registration, thread-termination hand-off and
/// drains, which are all rare. Recording itself only touches the owning
/// thread's buffer, whose lock is uncontended except for the moment a drain
/// swaps the chunk list out.
#[derive(Debug)]
pub(crate) struct Registry {
    sites: CallSiteTable,
    directory: Mutex<Directory>,
}

#[derive(Debug, Default)]
struct Directory {
    next_thread: u32,
    /// Buffers of threads that are still running.
    live: Vec<ThreadEntry>,
    /// Buffers handed off by threads that have terminated, kept until the
    /// next drain collects them.
    orphans: Vec<ThreadEntry>,
}

#[derive(Debug)]
struct ThreadEntry {
    thread: ThreadId,
    buffer: Arc<Mutex<EventBuffer>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            sites: CallSiteTable::new(),
            directory: Mutex::new(Directory::default()),
        }
    }

    pub(crate) fn intern_site(
        &self,
        file: &str,
        function: &str,
        line: NonZero<u32>,
        name_override: Option<&str>,
    ) -> CallSiteId {
        self.sites.intern(file, function, line, name_override)
    }

    /// Registers a new recording thread, returning its dense id and its
    /// buffer. The buffer stays discoverable through the directory for the
    /// whole life of the thread and beyond (see [`Registry::hand_off`]).
    fn register_thread(&self) -> (ThreadId, Arc<Mutex<EventBuffer>>) {
        let mut directory = self.directory.lock();

        let thread = ThreadId(directory.next_thread);
        directory.next_thread = directory
            .next_thread
            .checked_add(1)
            .expect("more than u32::MAX recording threads in one process is unrealistic");

        let buffer = Arc::new(Mutex::new(EventBuffer::new()));
        directory.live.push(ThreadEntry {
            thread,
            buffer: Arc::clone(&buffer),
        });

        (thread, buffer)
    }

    /// Moves a terminated thread's buffer into the orphan set, where the next
    /// drain will find it. Called from the thread-local recorder's destructor.
    fn hand_off(&self, thread: ThreadId) {
        let mut directory = self.directory.lock();

        if let Some(position) = directory
            .live
            .iter()
            .position(|entry| entry.thread == thread)
        {
            let entry = directory.live.swap_remove(position);
            directory.orphans.push(entry);
        }
    }

    /// Atomically takes every recorded event from every live and orphaned
    /// buffer, leaving all buffers empty.
    ///
    /// Two successive drains return disjoint event sets whose union covers
    /// exactly the events recorded in between: any scope exit that completed
    /// before this call is either in the returned snapshot or in the next one,
    /// never both, never neither.
    pub(crate) fn drain(&self) -> RecordedEvents {
        // The critical section only swaps chunk lists; flattening the chunks
        // into contiguous per-thread sequences happens after every lock is
        // released, so recording threads are stalled for one pointer swap at
        // most.
        let mut collected: Vec<(ThreadId, Vec<Vec<Event>>)> = Vec::new();
        {
            let mut directory = self.directory.lock();

            for entry in &directory.live {
                collected.push((entry.thread, entry.buffer.lock().take_chunks()));
            }

            for entry in directory.orphans.drain(..) {
                collected.push((entry.thread, entry.buffer.lock().take_chunks()));
            }
        }

        let threads = collected
            .into_iter()
            .filter_map(|(thread, chunks)| {
                let events: Vec<Event> = chunks.into_iter().flatten().collect();
                if events.is_empty() {
                    None
                } else {
                    Some(ThreadEvents::new(thread, events))
                }
            })
            .collect();

        RecordedEvents::new(self.sites.snapshot(), threads)
    }
}

/// The calling thread's handle to its own buffer, cached in thread-local
/// storage so the recording path does not touch the directory.
#[derive(Debug)]
struct ThreadRecorder {
    thread: ThreadId,
    buffer: Arc<Mutex<EventBuffer>>,
}

impl ThreadRecorder {
    fn append(&self, event: Event) {
        self.buffer.lock().append(event);
    }
}

impl Drop for ThreadRecorder {
    fn drop(&mut self) {
        global().hand_off(self.thread);
    }
}

thread_local! {
    static RECORDER: ThreadRecorder = {
        let (thread, buffer) = global().register_thread();
        ThreadRecorder { thread, buffer }
    };
}

/// Appends one event to the calling thread's buffer.
///
/// During thread-local teardown the recorder may already be gone; a scope
/// closing that late is silently dropped, leaving at worst a partial record,
/// which reconstruction tolerates.
pub(crate) fn record(event: Event) {
    let _ = RECORDER.try_with(|recorder| recorder.append(event));
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::clock::Timestamp;

    fn begin(site: CallSiteId, nanos: u64) -> Event {
        Event::begin(site, Timestamp::from_nanos(nanos))
    }

    fn end(site: CallSiteId, nanos: u64) -> Event {
        Event::end(site, Timestamp::from_nanos(nanos))
    }

    #[test]
    fn drain_takes_live_buffer_contents() {
        let registry = Registry::new();
        let site = registry.intern_site("lib.rs", "work", nz!(3), None);

        let (_, buffer) = registry.register_thread();
        buffer.lock().append(begin(site, 10));
        buffer.lock().append(end(site, 20));

        let drained = registry.drain();
        assert_eq!(drained.event_count(), 2);

        // The buffer keeps recording after a drain.
        buffer.lock().append(begin(site, 30));
        assert_eq!(registry.drain().event_count(), 1);
    }

    #[test]
    fn successive_drains_are_disjoint() {
        let registry = Registry::new();
        let site = registry.intern_site("lib.rs", "work", nz!(3), None);

        let (_, buffer) = registry.register_thread();
        buffer.lock().append(begin(site, 10));
        buffer.lock().append(end(site, 20));

        let first = registry.drain();
        let second = registry.drain();

        assert_eq!(first.event_count(), 2);
        assert_eq!(second.event_count(), 0);
    }

    #[test]
    fn orphaned_buffers_are_drained_once() {
        let registry = Registry::new();
        let site = registry.intern_site("lib.rs", "work", nz!(3), None);

        let (thread, buffer) = registry.register_thread();
        buffer.lock().append(begin(site, 10));
        buffer.lock().append(end(site, 20));
        registry.hand_off(thread);

        let drained = registry.drain();
        assert_eq!(drained.event_count(), 2);
        assert_eq!(registry.drain().event_count(), 0);
    }

    #[test]
    fn hand_off_of_unknown_thread_is_ignored() {
        let registry = Registry::new();
        registry.hand_off(ThreadId(42));
        assert_eq!(registry.drain().event_count(), 0);
    }

    #[test]
    fn thread_ids_are_never_reused() {
        let registry = Registry::new();

        let (first, _buffer_a) = registry.register_thread();
        registry.hand_off(first);
        let _ = registry.drain();

        let (second, _buffer_b) = registry.register_thread();
        assert_ne!(first, second);
    }

    static_assertions::assert_impl_all!(Registry: Send, Sync);
}
