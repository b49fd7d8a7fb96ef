mod shared;

use crash_monitor::{
    Annotation, Coordinator, ExceptionPolicy, Monitor, MonitorContext, MonitorFlags,
};
use shared::{FakeEnvironment, TestMonitor, record_events};

/// A user exception reported while a debugger is attached, from registration
/// all the way to the event being delivered
#[test]
fn user_exception_under_debugger() {
    let coordinator = Coordinator::with_environment(FakeEnvironment::debugged());
    let events = record_events(&coordinator);

    let a = TestMonitor::new("a", MonitorFlags::empty());
    let b = TestMonitor::new("b", MonitorFlags::DEBUGGER_UNSAFE);

    coordinator.add_monitor(a.clone()).unwrap();
    coordinator.add_monitor(b.clone()).unwrap();

    assert!(coordinator.activate_monitors());
    assert!(a.is_enabled());
    assert!(!b.is_enabled());

    let handler = a.handler();
    assert!(!handler.notify(ExceptionPolicy::fatal(false)));

    let mut ctx = MonitorContext::new("a");
    handler.handle(&mut ctx);

    let event_id = ctx.event_id.expect("a fresh event id is generated");
    assert!(!ctx.requires_async_safety);
    assert_eq!(ctx.annotation("a"), Some(Annotation::Bool(true)));
    assert!(ctx.annotation("b").is_none());

    assert_eq!(TestMonitor::count(&a.enrich_calls), 1);
    assert_eq!(TestMonitor::count(&b.enrich_calls), 0);

    {
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, Some(event_id));
        assert!(events[0].handling_crash);
        assert_eq!(events[0].enriched_by, vec!["a"]);
    }

    assert!(!a.is_enabled());
    assert!(!b.is_enabled());
    assert!(!ctx.handling_crash);
}

/// The process wide coordinator is created once and shared
#[test]
fn global_coordinator() {
    let first = Coordinator::global() as *const Coordinator;
    let second = Coordinator::global() as *const Coordinator;
    assert_eq!(first, second);

    let monitor = TestMonitor::new("global-scenario", MonitorFlags::empty());
    Coordinator::global().add_monitor(monitor.clone()).unwrap();
    let ids = Coordinator::global().monitor_ids();
    assert!(ids.iter().any(|id| id == "global-scenario"));

    Coordinator::global().remove_monitor(&*monitor);
    let ids = Coordinator::global().monitor_ids();
    assert!(!ids.iter().any(|id| id == "global-scenario"));
}
