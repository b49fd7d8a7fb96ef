use crate::{ExceptionHandler, MonitorContext};

bitflags::bitflags! {
    /// Describes in which environments a [`Monitor`] can be safely run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MonitorFlags: u32 {
        /// The monitor only performs async signal safe operations while
        /// handling a fault, so it may stay enabled once async safety is
        /// required.
        const ASYNC_SAFE = 1 << 0;
        /// The monitor interferes with, or is interfered with by, an attached
        /// debugger, eg. a signal handler racing the debugger for `SIGTRAP`.
        const DEBUGGER_UNSAFE = 1 << 1;
    }
}

/// A detector of crashes or other exceptional events.
///
/// Monitors are registered with a [`crate::Coordinator`], which decides
/// whether they are enabled. A monitor that detects a fault calls
/// [`ExceptionHandler::notify`] followed by [`ExceptionHandler::handle`] on
/// the handler it received in [`Self::init`].
///
/// All methods take `&self`, as monitors are shared between the thread that
/// registered them and whichever thread a fault is raised on, so
/// implementations need to use interior mutability, ideally atomics as
/// [`Self::is_enabled`] and [`Self::enrich_event`] can be called on the
/// fault path.
pub trait Monitor: Send + Sync {
    /// The unique identifier of the monitor, used to deduplicate registrations.
    ///
    /// An empty identifier is rejected by [`crate::Coordinator::add_monitor`].
    fn identifier(&self) -> &str;

    fn flags(&self) -> MonitorFlags {
        MonitorFlags::empty()
    }

    /// Called once when the monitor is registered, before it can be enabled.
    fn init(&self, handler: ExceptionHandler);

    /// Installs or uninstalls whatever hooks the monitor uses to detect faults
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Called after an activation pass for every monitor that ended up
    /// enabled. The registry lock is not held, so it is fine to register
    /// other monitors from here.
    fn notify_post_activation(&self) {}

    /// Adds whatever information this monitor has to an event that is being
    /// handled. Only called on enabled monitors, and may be called in an
    /// async signal context, see [`MonitorContext::requires_async_safety`].
    fn enrich_event(&self, _context: &mut MonitorContext<'_>) {}
}

/// User implemented trait for consuming a crash event once every enabled
/// monitor has enriched it.
///
/// # Safety
///
/// This trait is marked unsafe as care needs to be taken when implementing it
/// due to the [`Self::on_event`] method potentially being run in a
/// compromised context, eg. a signal handler. Check
/// [`MonitorContext::requires_async_safety`] before doing anything that is not
/// async signal safe, such as allocating.
pub unsafe trait EventConsumer: Send + Sync {
    fn on_event(&self, context: &MonitorContext<'_>);
}

/// Creates an [`EventConsumer`] using the supplied closure as the implementation.
///
/// # Safety
///
/// See the [`EventConsumer`] Safety section for information on why this is `unsafe`.
#[inline]
pub unsafe fn make_event_consumer<F>(closure: F) -> Box<dyn EventConsumer>
where
    F: Send + Sync + Fn(&MonitorContext<'_>) + 'static,
{
    struct Wrapper<F> {
        inner: F,
    }

    unsafe impl<F> EventConsumer for Wrapper<F>
    where
        F: Send + Sync + Fn(&MonitorContext<'_>),
    {
        fn on_event(&self, context: &MonitorContext<'_>) {
            (self.inner)(context);
        }
    }

    Box::new(Wrapper { inner: closure })
}
