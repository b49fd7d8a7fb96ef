#![allow(dead_code)]

use crash_monitor::{
    Coordinator, Environment, EventId, ExceptionHandler, Monitor, MonitorContext, MonitorFlags,
    make_event_consumer,
};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// An environment whose facts can be flipped at will
#[derive(Default)]
pub struct FakeEnvironment {
    pub debugger: AtomicBool,
    pub async_safety: AtomicBool,
}

impl FakeEnvironment {
    pub fn debugged() -> Arc<Self> {
        let env = Self::default();
        env.debugger.store(true, Ordering::SeqCst);
        Arc::new(env)
    }

    pub fn plain() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Environment for FakeEnvironment {
    fn is_debugger_attached(&self) -> bool {
        self.debugger.load(Ordering::SeqCst)
    }

    fn requires_async_safety(&self) -> bool {
        self.async_safety.load(Ordering::SeqCst)
    }
}

/// A monitor that records every call made to it
pub struct TestMonitor {
    pub id: &'static str,
    pub flags: MonitorFlags,
    enabled: AtomicBool,
    handler: Mutex<Option<ExceptionHandler>>,
    pub init_calls: AtomicUsize,
    pub disable_calls: AtomicUsize,
    pub enrich_calls: AtomicUsize,
    pub post_activation_calls: AtomicUsize,
}

impl TestMonitor {
    pub fn new(id: &'static str, flags: MonitorFlags) -> Arc<Self> {
        Arc::new(Self {
            id,
            flags,
            enabled: AtomicBool::new(false),
            handler: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            disable_calls: AtomicUsize::new(0),
            enrich_calls: AtomicUsize::new(0),
            post_activation_calls: AtomicUsize::new(0),
        })
    }

    pub fn handler(&self) -> ExceptionHandler {
        self.handler
            .lock()
            .clone()
            .expect("monitor was never initialized")
    }

    #[inline]
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl Monitor for TestMonitor {
    fn identifier(&self) -> &str {
        self.id
    }

    fn flags(&self) -> MonitorFlags {
        self.flags
    }

    fn init(&self, handler: ExceptionHandler) {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        *self.handler.lock() = Some(handler);
    }

    fn set_enabled(&self, enabled: bool) {
        if !enabled {
            self.disable_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn notify_post_activation(&self) {
        self.post_activation_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn enrich_event(&self, context: &mut MonitorContext<'_>) {
        self.enrich_calls.fetch_add(1, Ordering::SeqCst);
        context.annotate(self.id, true);
    }
}

/// What an event consumer observed
#[derive(Clone, Debug)]
pub struct Delivered {
    pub event_id: Option<EventId>,
    pub monitor_id: &'static str,
    pub handling_crash: bool,
    pub requires_async_safety: bool,
    pub crashed_during_crash_handling: bool,
    pub enriched_by: Vec<&'static str>,
}

/// Installs a consumer that records every event it receives
pub fn record_events(coordinator: &Coordinator) -> Arc<Mutex<Vec<Delivered>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let ev = events.clone();

    unsafe {
        coordinator.set_event_consumer(make_event_consumer(move |ctx: &MonitorContext<'_>| {
            ev.lock().push(Delivered {
                event_id: ctx.event_id,
                monitor_id: ctx.monitor_id,
                handling_crash: ctx.handling_crash,
                requires_async_safety: ctx.requires_async_safety,
                crashed_during_crash_handling: ctx.crashed_during_crash_handling,
                enriched_by: ctx.annotations().map(|(k, _)| k).collect(),
            });
        }));
    }

    events
}
