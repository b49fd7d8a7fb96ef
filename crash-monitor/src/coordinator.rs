use crate::{
    Environment, Error, EventConsumer, EventId, Monitor, MonitorContext, MonitorFlags,
    ProcessEnvironment, debug_print, fault_log,
    policy::{EpisodePhase, ExceptionPolicy, Notification, PolicyState},
    registry::{Registry, monitor_name},
};
use log::Level;
use std::sync::{
    Arc, OnceLock, Weak,
    atomic::{AtomicBool, Ordering},
};

struct Shared {
    registry: parking_lot::Mutex<Registry>,
    /// Gates the lazy setup of the registry so it happens exactly once
    initialized: AtomicBool,
    policy: PolicyState,
    environment: Arc<dyn Environment>,
    warned_about_debugger: AtomicBool,
}

impl Shared {
    fn init(&self) {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.registry.lock().reserve_initial();
    }

    /// Disables every monitor from the fault path.
    ///
    /// Unlike [`Coordinator::disable_all_monitors`] this never blocks, if the
    /// lock is held, eg. because we faulted while enriching an event, the
    /// monitors are left as they are.
    fn disable_all_on_fault_path(&self, async_safe: bool) {
        let Some(registry) = self.registry.try_lock() else {
            fault_log(
                Level::Error,
                async_safe,
                "unable to acquire the monitor registry lock, monitors were not disabled",
            );
            return;
        };

        for monitor in registry.iter() {
            monitor.set_enabled(false);
        }
        drop(registry);

        fault_log(Level::Debug, async_safe, "all monitors have been disabled");
    }

    fn notify(&self, recommendation: ExceptionPolicy) -> bool {
        match self.policy.record_notification(recommendation) {
            Notification::NonFatal | Notification::Fatal => false,
            Notification::CrashedDuringHandling => {
                let async_safe = self.policy.snapshot().async_safety;
                fault_log(
                    Level::Info,
                    async_safe,
                    "detected a crash in the crash handler, disabling all monitors",
                );
                self.disable_all_on_fault_path(async_safe);
                true
            }
        }
    }

    fn handle(&self, context: &mut MonitorContext<'_>) {
        let policy = self.policy.snapshot();
        let crashed_during_handling = self.policy.crashed_during_handling();

        context.handling_crash |= policy.is_fatal;
        context.requires_async_safety = policy.async_safety;
        if crashed_during_handling {
            context.crashed_during_crash_handling = true;
        }

        self.policy.begin_handling();
        debug_print!("handling exception");

        let consumer = {
            // If the fault happened while the registry was being modified
            // we can't wait for the lock, as we might be the ones holding it
            let Some(mut registry) = self.registry.try_lock() else {
                fault_log(
                    Level::Error,
                    policy.async_safety,
                    "unable to acquire the monitor registry lock, skipping exception handling",
                );
                self.policy.finish_handling();
                return;
            };

            let event_id = if policy.async_safety {
                // We never need more than the crash and the recrash, if the
                // pool is empty we're stuck in a handler loop
                let Some(id) = registry.event_ids.take() else {
                    fault_log(
                        Level::Error,
                        policy.async_safety,
                        "all pre-generated event ids have been used, skipping exception handling",
                    );
                    self.policy.finish_handling();
                    return;
                };
                id
            } else {
                EventId::generate()
            };

            context.event_id = Some(event_id);

            for monitor in registry.iter() {
                if monitor.is_enabled() {
                    monitor.enrich_event(context);
                }
            }

            // A monitor that crashed while enriching couldn't disable anything
            // in `notify` since we hold the lock, so do it on its behalf
            if self.policy.crashed_during_handling() {
                context.crashed_during_crash_handling = true;

                for monitor in registry.iter() {
                    monitor.set_enabled(false);
                }

                fault_log(
                    Level::Debug,
                    policy.async_safety,
                    "crashed while enriching the event, all monitors have been disabled",
                );
            }

            registry.consumer.clone()
        };

        if let Some(consumer) = consumer {
            debug_print!("delivering event");
            consumer.on_event(context);
        }

        // A crash in the consumer will already have disabled everything
        if self.policy.snapshot().is_fatal && !self.policy.crashed_during_handling() {
            fault_log(
                Level::Debug,
                policy.async_safety,
                "exception is fatal, disabling all monitors",
            );
            self.disable_all_on_fault_path(policy.async_safety);
        }

        context.handling_crash = false;
        self.policy.finish_handling();
    }
}

/// The callbacks a [`Monitor`] uses to report a fault it has detected.
///
/// This is handed to every monitor in [`Monitor::init`]. It only holds a weak
/// reference to the [`Coordinator`], so if the coordinator has been dropped
/// the callbacks do nothing.
#[derive(Clone)]
pub struct ExceptionHandler {
    shared: Weak<Shared>,
}

impl ExceptionHandler {
    /// Informs the coordinator that a fault has been detected, with the
    /// monitor's recommendation of how it should be handled.
    ///
    /// Returns true if this is a fatal fault that happened while a previous
    /// fatal fault was still being handled, in which case all monitors have
    /// been disabled, and the monitor should restore the original handlers
    /// and let the fault take its course.
    ///
    /// This is async signal safe.
    #[inline]
    pub fn notify(&self, recommendation: ExceptionPolicy) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.notify(recommendation))
    }

    /// Handles a fault after [`Self::notify`] has been called.
    ///
    /// Assigns an event id to the context, lets every enabled monitor enrich
    /// it, then passes it to the registered [`EventConsumer`]. If the fault is
    /// fatal every monitor is disabled afterwards.
    ///
    /// Handling is skipped entirely if the registry is locked, or if async
    /// safety is required and no pre-generated event id is left.
    ///
    /// This is async signal safe if [`MonitorContext::requires_async_safety`]
    /// ends up being true, provided the enabled monitors and the consumer are
    /// as well.
    #[inline]
    pub fn handle(&self, context: &mut MonitorContext<'_>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle(context);
        }
    }
}

/// Coordinates a set of [`Monitor`]s.
///
/// Cloning a coordinator gives another handle to the same state.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Creates a coordinator that inspects the current process to decide
    /// which monitors can be enabled.
    pub fn new() -> Self {
        Self::with_environment(Arc::new(ProcessEnvironment))
    }

    pub fn with_environment(environment: Arc<dyn Environment>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: parking_lot::Mutex::new(Registry::new()),
                initialized: AtomicBool::new(false),
                policy: PolicyState::new(),
                environment,
                warned_about_debugger: AtomicBool::new(false),
            }),
        }
    }

    /// The process wide coordinator, created on first use
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Coordinator> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// The callbacks passed to monitors when they are registered
    #[inline]
    pub fn exception_handler(&self) -> ExceptionHandler {
        ExceptionHandler {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Registers a monitor.
    ///
    /// The monitor's [`Monitor::init`] is called with the lock held, so it
    /// must not call back into the coordinator. It will be disabled until the
    /// next call to [`Self::activate_monitors`].
    pub fn add_monitor(&self, monitor: Arc<dyn Monitor>) -> Result<(), Error> {
        self.shared.init();

        let id = monitor.identifier();
        if id.is_empty() {
            log::error!("attempted to add a monitor without an identifier");
            return Err(Error::MissingIdentifier);
        }

        let mut registry = self.shared.registry.lock();

        if registry.contains(id) {
            log::error!("monitor '{id}' is already registered");
            return Err(Error::DuplicateMonitor { id: id.to_owned() });
        }

        monitor.init(self.exception_handler());
        log::debug!("monitor '{id}' added");
        registry.push(monitor);

        Ok(())
    }

    /// Disables and unregisters a monitor, does nothing if it was never
    /// registered
    pub fn remove_monitor(&self, monitor: &dyn Monitor) {
        let removed = self.shared.registry.lock().remove(monitor);

        if removed.is_some() {
            log::debug!("monitor '{}' removed", monitor_name(monitor));
        } else {
            log::debug!(
                "monitor '{}' is not registered, nothing to remove",
                monitor_name(monitor)
            );
        }
    }

    #[inline]
    pub fn monitor_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// The identifiers of every registered monitor
    pub fn monitor_ids(&self) -> Vec<String> {
        self.shared
            .registry
            .lock()
            .iter()
            .map(|m| m.identifier().to_owned())
            .collect()
    }

    /// Sets the consumer that receives every handled event, replacing the
    /// previous one
    pub fn set_event_consumer(&self, consumer: Box<dyn EventConsumer>) {
        self.shared.init();
        let previous = self
            .shared
            .registry
            .lock()
            .consumer
            .replace(Arc::from(consumer));
        drop(previous);
    }

    pub fn clear_event_consumer(&self) {
        let previous = self.shared.registry.lock().consumer.take();
        drop(previous);
    }

    /// Enables every monitor that can safely run in the current environment,
    /// and disables the rest.
    ///
    /// Monitors flagged [`MonitorFlags::DEBUGGER_UNSAFE`] are disabled if a
    /// debugger is attached, and monitors that aren't
    /// [`MonitorFlags::ASYNC_SAFE`] are disabled if async safety is required.
    /// The enabled monitors are then notified via
    /// [`Monitor::notify_post_activation`], without the lock held.
    ///
    /// Returns true if at least one monitor is enabled.
    pub fn activate_monitors(&self) -> bool {
        self.shared.init();

        let environment = &self.shared.environment;
        let debugger_attached = environment.is_debugger_attached();
        let async_safety_required =
            self.shared.policy.snapshot().async_safety || environment.requires_async_safety();

        if debugger_attached && !self.shared.warned_about_debugger.swap(true, Ordering::AcqRel) {
            log::warn!(
                "    ************************ Crash Handler Notice ************************"
            );
            log::warn!(
                "    *     App is running in a debugger. Masking out unsafe monitors.     *"
            );
            log::warn!(
                "    * This means that most crashes WILL NOT BE RECORDED while debugging! *"
            );
            log::warn!(
                "    **********************************************************************"
            );
        }

        if async_safety_required {
            log::debug!("async safe environment detected, masking out unsafe monitors");
        }

        let enabled: Vec<_> = {
            let mut registry = self.shared.registry.lock();
            // Generating ids is not async signal safe, so this is the place to do it
            registry.event_ids.regenerate();

            for monitor in registry.iter() {
                let flags = monitor.flags();

                let should_enable = !(debugger_attached
                    && flags.contains(MonitorFlags::DEBUGGER_UNSAFE))
                    && !(async_safety_required && !flags.contains(MonitorFlags::ASYNC_SAFE));

                monitor.set_enabled(should_enable);
            }

            log::debug!("active monitors are now:");
            registry
                .iter()
                .filter(|monitor| {
                    let enabled = monitor.is_enabled();
                    log::debug!(
                        "monitor '{}' is {}",
                        monitor_name(&***monitor),
                        if enabled { "enabled" } else { "disabled" }
                    );
                    enabled
                })
                .cloned()
                .collect()
        };

        // The lock is released so monitors can register other monitors
        for monitor in &enabled {
            monitor.notify_post_activation();
        }

        if enabled.is_empty() {
            log::warn!("no monitors are enabled, crashes will not be recorded");
        }

        !enabled.is_empty()
    }

    /// Disables every registered monitor
    pub fn disable_all_monitors(&self) {
        let registry = self.shared.registry.lock();
        for monitor in registry.iter() {
            monitor.set_enabled(false);
        }
        drop(registry);

        log::debug!("all monitors have been disabled");
    }

    /// See [`ExceptionHandler::notify`]
    #[inline]
    pub fn notify(&self, recommendation: ExceptionPolicy) -> bool {
        self.shared.notify(recommendation)
    }

    /// See [`ExceptionHandler::handle`]
    #[inline]
    pub fn handle(&self, context: &mut MonitorContext<'_>) {
        self.shared.handle(context);
    }

    /// The exception policy accumulated from every notification since the
    /// last reset
    #[inline]
    pub fn policy(&self) -> ExceptionPolicy {
        self.shared.policy.snapshot()
    }

    #[inline]
    pub fn phase(&self) -> EpisodePhase {
        self.shared.policy.phase()
    }

    /// True if a fatal fault was reported while another was being handled
    #[inline]
    pub fn crashed_during_handling(&self) -> bool {
        self.shared.policy.crashed_during_handling()
    }

    /// Allows async unsafe monitors to be enabled again on the next
    /// activation, once the fault that required async safety has passed
    #[inline]
    pub fn clear_async_safety_requirement(&self) {
        self.shared.policy.clear_async_safety();
    }

    /// Replaces the pre-generated event ids with fresh ones
    pub fn regenerate_event_ids(&self) {
        self.shared.registry.lock().event_ids.regenerate();
    }

    /// Unregisters every monitor, without disabling them, drops the event
    /// consumer, and resets the exception policy and event ids.
    ///
    /// This is intended for tests and recovery flows, never call it while a
    /// fault may be in flight.
    pub fn reset_state(&self) {
        let (monitors, consumer) = {
            let mut registry = self.shared.registry.lock();
            registry.event_ids.regenerate();
            (registry.take_all(), registry.consumer.take())
        };
        self.shared.initialized.store(false, Ordering::Release);
        self.shared.policy.reset();

        drop(consumer);
        drop(monitors);
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
