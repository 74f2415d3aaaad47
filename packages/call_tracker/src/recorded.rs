//! The raw drain snapshot and its on-disk form.
//!
//! A drain first takes the raw events (this type), then aggregates them into
//! a [`Report`]. Surfacing the intermediate value gives persistence a
//! round-trippable unit and gives tests a way to aggregate hand-constructed
//! event streams deterministically.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::num::NonZero;
use std::path::Path;

use thiserror::Error;

use crate::clock::Timestamp;
use crate::event::{Event, EventKind, ThreadId};
use crate::reconstruct;
use crate::report::{self, Report, ResultSettings};
use crate::site::{CallSite, CallSiteId};
use crate::stats::{self, AggregationMode};

/// File identification prefix of the event-dump format.
const MAGIC: [u8; 4] = *b"CTRK";

/// Current version of the event-dump format.
const FORMAT_VERSION: u32 = 1;

/// One thread's events, in program order.
#[derive(Clone, Debug)]
pub struct ThreadEvents {
    thread: ThreadId,
    events: Vec<Event>,
}

impl ThreadEvents {
    pub(crate) fn new(thread: ThreadId, events: Vec<Event>) -> Self {
        Self { thread, events }
    }

    pub(crate) fn thread(&self) -> ThreadId {
        self.thread
    }

    pub(crate) fn events(&self) -> &[Event] {
        &self.events
    }
}

/// Everything one drain extracted: the call-site table and every thread's
/// event sequence.
///
/// Obtained from [`drain_raw`](crate::drain_raw) or loaded from a dump with
/// [`RecordedEvents::read_from`]. Aggregating a loaded dump yields the same
/// report as aggregating the live snapshot it was written from.
///
/// # Examples
///
/// ```no_run
/// fn traced() {
///     call_tracker::track!();
/// }
///
/// traced();
///
/// let recorded = call_tracker::drain_raw();
/// recorded.write_to("run.ctrk")?;
///
/// let loaded = call_tracker::RecordedEvents::read_from("run.ctrk")?;
/// let report = loaded.aggregate();
/// assert_eq!(report.summary_rows().len(), 1);
/// # Ok::<(), call_tracker::DumpError>(())
/// ```
#[derive(Clone, Debug)]
pub struct RecordedEvents {
    sites: Vec<CallSite>,
    threads: Vec<ThreadEvents>,
}

impl RecordedEvents {
    pub(crate) fn new(sites: Vec<CallSite>, threads: Vec<ThreadEvents>) -> Self {
        Self { sites, threads }
    }

    /// Total number of recorded events across all threads.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.threads.iter().map(|thread| thread.events.len()).sum()
    }

    /// Whether the snapshot holds any events at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Aggregates with default settings and the default aggregation mode.
    #[must_use]
    pub fn aggregate(&self) -> Report {
        self.aggregate_with(ResultSettings::default(), AggregationMode::default())
    }

    /// Aggregates into a [`Report`]: reconstruction, per-site statistics,
    /// filtering and ordering.
    #[must_use]
    pub fn aggregate_with(&self, settings: ResultSettings, mode: AggregationMode) -> Report {
        let settings = settings.clamped();

        let timelines = reconstruct::reconstruct_all(&self.threads);
        let (site_stats, errors) = stats::compute_all(
            timelines,
            settings.non_center_percent(),
            settings.percent_exclude_fastest_active_exclusive(),
            mode,
        );

        report::assemble(&self.sites, site_stats, errors, settings)
    }

    /// Writes the snapshot to `path` in the raw event-dump format.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), DumpError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the snapshot to an arbitrary sink in the raw event-dump format.
    pub fn write(&self, writer: &mut impl Write) -> Result<(), DumpError> {
        writer.write_all(&MAGIC)?;
        write_u32(writer, FORMAT_VERSION)?;

        write_u32(
            writer,
            u32::try_from(self.sites.len())
                .expect("call-site ids are u32, so the site count fits u32"),
        )?;
        for (index, site) in self.sites.iter().enumerate() {
            write_u32(writer, CallSiteId::new(index).as_u32())?;
            write_u32(writer, site.line().get())?;
            write_str(writer, site.file())?;
            write_str(writer, site.function())?;
            match site.name_override() {
                Some(name) => {
                    writer.write_all(&[1])?;
                    write_str(writer, name)?;
                }
                None => writer.write_all(&[0])?,
            }
        }

        for thread in &self.threads {
            for event in &thread.events {
                write_u32(writer, thread.thread.as_u32())?;
                writer.write_all(&[match event.kind {
                    EventKind::Begin => 0,
                    EventKind::End => 1,
                }])?;
                write_u32(writer, event.site.as_u32())?;
                write_u64(writer, event.timestamp.as_nanos())?;
            }
        }

        Ok(())
    }

    /// Loads a snapshot previously written with [`RecordedEvents::write_to`].
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, DumpError> {
        Self::read(&mut BufReader::new(File::open(path)?))
    }

    /// Loads a snapshot from an arbitrary source.
    pub fn read(reader: &mut impl Read) -> Result<Self, DumpError> {
        let mut magic = [0_u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(DumpError::BadMagic);
        }

        let version = read_u32(reader)?;
        if version != FORMAT_VERSION {
            return Err(DumpError::UnsupportedVersion { found: version });
        }

        let site_count = read_u32(reader)?;
        let mut sites = Vec::with_capacity(site_count as usize);
        for expected in 0..site_count {
            let id = read_u32(reader)?;
            if id != expected {
                return Err(DumpError::NonDenseSiteTable { found: id });
            }

            let line = read_u32(reader)?;
            let line = NonZero::new(line).ok_or(DumpError::ZeroLine { site: id })?;
            let file = read_str(reader)?;
            let function = read_str(reader)?;
            let name_override = match read_u8(reader)? {
                0 => None,
                1 => Some(read_str(reader)?),
                flag => return Err(DumpError::InvalidNameFlag { found: flag }),
            };

            sites.push(CallSite::new(file, function, line, name_override));
        }

        // Events are grouped back per thread, preserving each thread's
        // record order.
        let mut threads: Vec<ThreadEvents> = Vec::new();
        let mut thread_index: foldhash::HashMap<u32, usize> = foldhash::HashMap::default();
        loop {
            let thread = match try_read_u32(reader)? {
                Some(thread) => thread,
                None => break,
            };

            let kind = match read_u8(reader)? {
                0 => EventKind::Begin,
                1 => EventKind::End,
                byte => return Err(DumpError::InvalidEventKind { found: byte }),
            };
            let site = read_u32(reader)?;
            if site >= site_count {
                return Err(DumpError::UnknownCallSite { site });
            }
            let timestamp = Timestamp::from_nanos(read_u64(reader)?);

            let site = CallSiteId::from_u32(site);
            let event = match kind {
                EventKind::Begin => Event::begin(site, timestamp),
                EventKind::End => Event::end(site, timestamp),
            };

            let index = *thread_index.entry(thread).or_insert_with(|| {
                threads.push(ThreadEvents::new(ThreadId(thread), Vec::new()));
                threads.len() - 1
            });
            threads
                .get_mut(index)
                .expect("index was just produced from this vector")
                .events
                .push(event);
        }

        Ok(Self { sites, threads })
    }
}

/// A defect encountered while writing or reading an event dump.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("dump I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("not an event dump: bad magic bytes")]
    BadMagic,

    #[error("unsupported event dump version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("call-site table is not dense: unexpected id {found}")]
    NonDenseSiteTable { found: u32 },

    #[error("call-site {site} has a zero source line")]
    ZeroLine { site: u32 },

    #[error("invalid name-override flag {found}")]
    InvalidNameFlag { found: u8 },

    #[error("invalid event kind byte {found}")]
    InvalidEventKind { found: u8 },

    #[error("event refers to unknown call-site {site}")]
    UnknownCallSite { site: u32 },

    #[error("dump contains a string that is not valid UTF-8")]
    InvalidString(#[from] std::string::FromUtf8Error),
}

fn write_u32(writer: &mut impl Write, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u64(writer: &mut impl Write, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_str(writer: &mut impl Write, value: &str) -> io::Result<()> {
    write_u32(
        writer,
        u32::try_from(value.len()).expect("source paths and names are far shorter than 4 GiB"),
    )?;
    writer.write_all(value.as_bytes())
}

fn read_u8(reader: &mut impl Read) -> io::Result<u8> {
    let mut buffer = [0_u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buffer = [0_u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

/// Reads a u32 or reports a clean end of input at a record boundary.
fn try_read_u32(reader: &mut impl Read) -> io::Result<Option<u32>> {
    let mut buffer = [0_u8; 4];
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..])?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::from(ErrorKind::UnexpectedEof));
        }
        filled += read;
    }
    Ok(Some(u32::from_le_bytes(buffer)))
}

fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buffer = [0_u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

fn read_str(reader: &mut impl Read) -> Result<String, DumpError> {
    let length = read_u32(reader)? as usize;
    let mut buffer = vec![0_u8; length];
    reader.read_exact(&mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    fn sample() -> RecordedEvents {
        let sites = vec![
            CallSite::new("src/lib.rs", "parse", nz!(10), None),
            CallSite::new("src/lib.rs", "emit", nz!(42), Some("hot loop".to_string())),
        ];
        let site = |id: u32| CallSiteId::from_u32(id);
        let ts = Timestamp::from_nanos;

        let threads = vec![
            ThreadEvents::new(
                ThreadId(0),
                vec![
                    Event::begin(site(0), ts(0)),
                    Event::begin(site(1), ts(100)),
                    Event::end(site(1), ts(700)),
                    Event::end(site(0), ts(1_000)),
                ],
            ),
            ThreadEvents::new(
                ThreadId(1),
                vec![Event::begin(site(1), ts(50)), Event::end(site(1), ts(600))],
            ),
        ];

        RecordedEvents::new(sites, threads)
    }

    fn round_trip(original: &RecordedEvents) -> RecordedEvents {
        let mut buffer = Vec::new();
        original.write(&mut buffer).expect("writing to memory cannot fail");
        RecordedEvents::read(&mut buffer.as_slice()).expect("reading back a fresh dump")
    }

    #[test]
    fn round_trip_preserves_everything() {
        let original = sample();
        let loaded = round_trip(&original);

        assert_eq!(loaded.sites, original.sites);
        assert_eq!(loaded.event_count(), original.event_count());
        for (a, b) in loaded.threads.iter().zip(&original.threads) {
            assert_eq!(a.thread, b.thread);
            assert_eq!(a.events, b.events);
        }
    }

    #[test]
    fn round_trip_preserves_the_aggregated_report() {
        let original = sample();
        let loaded = round_trip(&original);

        let live = original.aggregate();
        let from_dump = loaded.aggregate();

        assert_eq!(live.to_string(), from_dump.to_string());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let result = RecordedEvents::read(&mut &b"NOPE"[..]);
        assert!(matches!(result, Err(DumpError::BadMagic)));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&MAGIC);
        buffer.extend_from_slice(&99_u32.to_le_bytes());
        buffer.extend_from_slice(&0_u32.to_le_bytes());

        let result = RecordedEvents::read(&mut buffer.as_slice());
        assert!(matches!(
            result,
            Err(DumpError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn event_with_unknown_site_is_rejected() {
        let mut buffer = Vec::new();
        RecordedEvents::new(Vec::new(), Vec::new())
            .write(&mut buffer)
            .expect("writing to memory cannot fail");
        // Append one event referring to site 7 of an empty table.
        buffer.extend_from_slice(&0_u32.to_le_bytes());
        buffer.push(0);
        buffer.extend_from_slice(&7_u32.to_le_bytes());
        buffer.extend_from_slice(&0_u64.to_le_bytes());

        let result = RecordedEvents::read(&mut buffer.as_slice());
        assert!(matches!(result, Err(DumpError::UnknownCallSite { site: 7 })));
    }

    #[test]
    fn truncated_record_is_an_io_error() {
        let mut buffer = Vec::new();
        sample().write(&mut buffer).expect("writing to memory cannot fail");
        buffer.truncate(buffer.len() - 3);

        let result = RecordedEvents::read(&mut buffer.as_slice());
        assert!(matches!(result, Err(DumpError::Io(_))));
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let empty = RecordedEvents::new(Vec::new(), Vec::new());
        let loaded = round_trip(&empty);

        assert!(loaded.is_empty());
        assert!(loaded.aggregate().is_empty());
    }

    static_assertions::assert_impl_all!(RecordedEvents: Send, Sync);
    static_assertions::assert_impl_all!(DumpError: Send, Sync);
}
