//! The fixed-width records appended to per-thread event buffers.

use crate::clock::Timestamp;
use crate::site::CallSiteId;

/// Whether an event marks a scope entry or a scope exit.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Begin,
    End,
}

/// One recorded transition: a scope at `site` began or ended at `timestamp`.
///
/// Per thread, events form a balanced nest: every `End` matches the most
/// recent unmatched `Begin` on the same buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Event {
    pub(crate) kind: EventKind,
    pub(crate) site: CallSiteId,
    pub(crate) timestamp: Timestamp,
}

impl Event {
    pub(crate) fn begin(site: CallSiteId, timestamp: Timestamp) -> Self {
        Self {
            kind: EventKind::Begin,
            site,
            timestamp,
        }
    }

    pub(crate) fn end(site: CallSiteId, timestamp: Timestamp) -> Self {
        Self {
            kind: EventKind::End,
            site,
            timestamp,
        }
    }
}

/// Identifies one recording thread.
///
/// Ids are dense, assigned when a thread first records, and never reused,
/// so a thread that terminates and a thread that starts later cannot be
/// confused in the aggregated output.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ThreadId(pub(crate) u32);

impl ThreadId {
    pub(crate) fn as_u32(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn begin_and_end_carry_their_kind() {
        let site = CallSiteId::new(0);

        let begin = Event::begin(site, Timestamp::from_nanos(5));
        let end = Event::end(site, Timestamp::from_nanos(9));

        assert_eq!(begin.kind, EventKind::Begin);
        assert_eq!(end.kind, EventKind::End);
        assert_eq!(begin.site, end.site);
        assert!(begin.timestamp < end.timestamp);
    }

    static_assertions::assert_impl_all!(Event: Send, Sync, Copy);
}
