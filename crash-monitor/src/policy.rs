use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// How a fault should be handled, as recommended by the monitor that detected
/// it, or as accumulated by the coordinator across notifications.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExceptionPolicy {
    /// The process will terminate once the fault has been reported
    pub is_fatal: bool,
    /// Only async signal safe operations may be performed while handling
    /// the fault
    pub async_safety: bool,
}

impl ExceptionPolicy {
    #[inline]
    pub const fn fatal(async_safety: bool) -> Self {
        Self {
            is_fatal: true,
            async_safety,
        }
    }

    #[inline]
    pub const fn non_fatal(async_safety: bool) -> Self {
        Self {
            is_fatal: false,
            async_safety,
        }
    }
}

/// Where the coordinator is in the handling of a single fault episode.
///
/// Episodes can nest, eg. a monitor faulting while enriching an event, in
/// which case the phase stays [`Self::Handling`] until the outermost
/// `handle` returns.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EpisodePhase {
    /// No fault has been reported since creation or the last reset
    Idle = 0,
    /// A monitor has called `notify` but not yet `handle`
    Notified = 1,
    /// `handle` is in progress
    Handling = 2,
    /// `handle` has returned, successfully or not
    Done = 3,
}

impl EpisodePhase {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Notified,
            2 => Self::Handling,
            3 => Self::Done,
            _ => Self::Idle,
        }
    }
}

/// The outcome of recording a notification
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Notification {
    NonFatal,
    Fatal,
    /// A fatal fault was reported while a previous fatal fault was in flight
    CrashedDuringHandling,
}

/// The process wide exception policy.
///
/// Everything is atomic since it is read and written from the fault path,
/// where we can't block on a lock.
pub(crate) struct PolicyState {
    is_fatal: AtomicBool,
    async_safety: AtomicBool,
    crashed_during_handling: AtomicBool,
    phase: AtomicU8,
    /// The number of `handle` calls currently in progress
    handling_depth: AtomicUsize,
}

impl PolicyState {
    pub(crate) const fn new() -> Self {
        Self {
            is_fatal: AtomicBool::new(false),
            async_safety: AtomicBool::new(false),
            crashed_during_handling: AtomicBool::new(false),
            phase: AtomicU8::new(EpisodePhase::Idle as u8),
            handling_depth: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub(crate) fn snapshot(&self) -> ExceptionPolicy {
        ExceptionPolicy {
            is_fatal: self.is_fatal.load(Ordering::Acquire),
            async_safety: self.async_safety.load(Ordering::Acquire),
        }
    }

    #[inline]
    pub(crate) fn crashed_during_handling(&self) -> bool {
        self.crashed_during_handling.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn phase(&self) -> EpisodePhase {
        if self.handling_depth.load(Ordering::Acquire) > 0 {
            return EpisodePhase::Handling;
        }

        EpisodePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Folds a monitor's recommendation into the policy.
    ///
    /// Async safety is only ever accumulated, never cleared, and a fatal
    /// recommendation while the policy is already fatal marks that we crashed
    /// during crash handling, which is sticky until [`Self::reset`].
    pub(crate) fn record_notification(&self, recommendation: ExceptionPolicy) -> Notification {
        self.async_safety
            .fetch_or(recommendation.async_safety, Ordering::AcqRel);
        self.phase.store(EpisodePhase::Notified as u8, Ordering::Release);

        if !recommendation.is_fatal {
            return Notification::NonFatal;
        }

        if self.is_fatal.swap(true, Ordering::AcqRel) {
            self.crashed_during_handling.store(true, Ordering::Release);
        }

        if self.crashed_during_handling() {
            Notification::CrashedDuringHandling
        } else {
            Notification::Fatal
        }
    }

    #[inline]
    pub(crate) fn begin_handling(&self) {
        self.handling_depth.fetch_add(1, Ordering::AcqRel);
        self.phase.store(EpisodePhase::Handling as u8, Ordering::Release);
    }

    /// Only the outermost `handle` finishing completes the episode
    #[inline]
    pub(crate) fn finish_handling(&self) {
        let previous = self
            .handling_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| depth.checked_sub(1))
            .unwrap_or(0);

        if previous <= 1 {
            self.phase.store(EpisodePhase::Done as u8, Ordering::Release);
        }
    }

    #[inline]
    pub(crate) fn clear_async_safety(&self) {
        self.async_safety.store(false, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.is_fatal.store(false, Ordering::Release);
        self.async_safety.store(false, Ordering::Release);
        self.crashed_during_handling.store(false, Ordering::Release);
        self.phase.store(EpisodePhase::Idle as u8, Ordering::Release);
        self.handling_depth.store(0, Ordering::Release);
    }
}
