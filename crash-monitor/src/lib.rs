//! [`Coordinator`] arbitrates between independent crash [`Monitor`]s, deciding
//! which of them may run in the current environment, and drives the protocol
//! that turns a fault detected by one of them into a single crash event.
//!
//! # Monitors
//!
//! A monitor is any detector of exceptional events, eg. a signal handler, a
//! hook for uncaught language exceptions, or a watchdog. Monitors are
//! registered with [`Coordinator::add_monitor`] and are handed an
//! [`ExceptionHandler`] when they are. Once activated via
//! [`Coordinator::activate_monitors`], a monitor that detects a fault must
//! call [`ExceptionHandler::notify`] followed by [`ExceptionHandler::handle`].
//!
//! # Activation
//!
//! Not every monitor can run everywhere. Monitors flagged with
//! [`MonitorFlags::DEBUGGER_UNSAFE`] are masked out when a debugger is
//! attached to the process, and monitors lacking [`MonitorFlags::ASYNC_SAFE`]
//! are masked out once async signal safety is required. The environment is
//! only evaluated when [`Coordinator::activate_monitors`] is called, so if a
//! debugger attaches afterwards, monitors are not re-evaluated until the next
//! activation.
//!
//! # The fault path
//!
//! [`ExceptionHandler::handle`] can be called from a signal handler, possibly
//! on a corrupted stack, where only a small subset of operations are
//! [async signal safe](https://man7.org/linux/man-pages/man7/signal-safety.7.html).
//! When async safety is required the fault path does not allocate, only
//! ever _tries_ to acquire the registry lock, and takes event identifiers
//! from a pool of [`EVENT_ID_POOL_SIZE`] identifiers generated ahead of time.
//!
//! If a second fatal fault is reported while the first is still being
//! handled, the coordinator records that it crashed during crash handling,
//! makes that visible on the [`MonitorContext`], and disables every monitor
//! to avoid looping in the handlers.

#![allow(unsafe_code)]

mod context;
mod coordinator;
mod environment;
mod error;
mod event_id;
mod monitor;
mod policy;
mod registry;

pub use context::{Annotation, MAX_ANNOTATIONS, MonitorContext};
pub use coordinator::{Coordinator, ExceptionHandler};
pub use environment::{Environment, ProcessEnvironment};
pub use error::Error;
pub use event_id::{EVENT_ID_POOL_SIZE, EventId, EventIdPool};
pub use monitor::{EventConsumer, Monitor, MonitorFlags, make_event_consumer};
pub use policy::{EpisodePhase, ExceptionPolicy};

pub use crash_context::CrashContext;

#[cfg(feature = "debug-print")]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {
        let cstr = concat!($s, "\n");
        $crate::write_stderr(cstr);
    };
}

#[cfg(not(feature = "debug-print"))]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {};
}

/// Writes the specified string directly to stderr.
///
/// This is safe to be called from within a compromised context.
#[inline]
pub fn write_stderr(s: &'static str) {
    unsafe {
        #[cfg(target_os = "windows")]
        libc::write(2, s.as_ptr().cast(), s.len() as u32);

        #[cfg(not(target_os = "windows"))]
        libc::write(2, s.as_ptr().cast(), s.len());
    }
}

/// Reports a message from the fault path.
///
/// If async signal safety is required the message is only written with a raw
/// `write` to stderr, and only if the `debug-print` feature is enabled,
/// otherwise it goes through [`log`].
#[inline]
pub(crate) fn fault_log(level: log::Level, async_safe: bool, msg: &'static str) {
    if async_safe {
        if cfg!(feature = "debug-print") {
            write_stderr(msg);
            write_stderr("\n");
        }
    } else {
        log::log!(level, "{msg}");
    }
}
