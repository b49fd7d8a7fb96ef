use crate::EventId;
use std::fmt;

/// The maximum number of annotations that can be attached to a single
/// [`MonitorContext`]
pub const MAX_ANNOTATIONS: usize = 16;

/// A value monitors can attach to an event while enriching it.
///
/// Only types that can be copied without allocating are supported, as
/// enrichment may happen in an async signal context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(&'static str),
}

impl From<bool> for Annotation {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Annotation {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Annotation {
    fn from(u: u64) -> Self {
        Self::UInt(u)
    }
}

impl From<&'static str> for Annotation {
    fn from(s: &'static str) -> Self {
        Self::Str(s)
    }
}

/// The event that is built up while handling a single fault.
///
/// The monitor that detected the fault creates this and passes it to
/// [`crate::ExceptionHandler::handle`], which fills in the coordinator's
/// state, lets every enabled monitor enrich it, then hands it to the
/// registered [`crate::EventConsumer`].
pub struct MonitorContext<'a> {
    /// The identifier assigned to this event, `None` until handled
    pub event_id: Option<EventId>,
    /// The identifier of the monitor that detected the fault
    pub monitor_id: &'static str,
    /// True while the fault is being handled, if the fault is fatal
    pub handling_crash: bool,
    /// Whether only async signal safe operations may be performed
    pub requires_async_safety: bool,
    /// True if this fault happened while a previous fatal fault was still
    /// being handled
    pub crashed_during_crash_handling: bool,
    /// The machine context of the faulting thread, if one was captured
    pub crash_context: Option<&'a crash_context::CrashContext>,
    annotations: [Option<(&'static str, Annotation)>; MAX_ANNOTATIONS],
    annotation_count: usize,
}

impl<'a> MonitorContext<'a> {
    pub fn new(monitor_id: &'static str) -> Self {
        Self {
            event_id: None,
            monitor_id,
            handling_crash: false,
            requires_async_safety: false,
            crashed_during_crash_handling: false,
            crash_context: None,
            annotations: [None; MAX_ANNOTATIONS],
            annotation_count: 0,
        }
    }

    /// Attaches the machine context captured for the faulting thread
    #[inline]
    pub fn with_crash_context(mut self, cc: &'a crash_context::CrashContext) -> Self {
        self.crash_context = Some(cc);
        self
    }

    /// Attaches a value to the event, replacing any previous value with the
    /// same key.
    ///
    /// Returns false if the key is new and there is no more room.
    pub fn annotate(&mut self, key: &'static str, value: impl Into<Annotation>) -> bool {
        let value = value.into();

        for (existing, slot) in self.annotations[..self.annotation_count]
            .iter_mut()
            .flatten()
        {
            if *existing == key {
                *slot = value;
                return true;
            }
        }

        let Some(slot) = self.annotations.get_mut(self.annotation_count) else {
            return false;
        };

        *slot = Some((key, value));
        self.annotation_count += 1;
        true
    }

    #[inline]
    pub fn annotation(&self, key: &str) -> Option<Annotation> {
        self.annotations()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Iterates over the annotations in the order they were first added
    pub fn annotations(&self) -> impl Iterator<Item = (&'static str, Annotation)> + '_ {
        self.annotations[..self.annotation_count]
            .iter()
            .flatten()
            .copied()
    }
}

impl fmt::Debug for MonitorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorContext")
            .field("event_id", &self.event_id)
            .field("monitor_id", &self.monitor_id)
            .field("handling_crash", &self.handling_crash)
            .field("requires_async_safety", &self.requires_async_safety)
            .field(
                "crashed_during_crash_handling",
                &self.crashed_during_crash_handling,
            )
            .field("has_crash_context", &self.crash_context.is_some())
            .field("annotation_count", &self.annotation_count)
            .finish()
    }
}
