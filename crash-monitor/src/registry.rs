use crate::{EventConsumer, EventIdPool, Monitor};
use std::sync::Arc;

/// The capacity reserved the first time the registry is used, there are
/// rarely more monitors than this
pub(crate) const INITIAL_MONITOR_CAPACITY: usize = 15;

/// Everything guarded by the coordinator's lock.
///
/// The fault path only ever _tries_ to lock this, so nothing in here may be
/// locked for long or do anything that could itself fault.
pub(crate) struct Registry {
    monitors: Vec<Arc<dyn Monitor>>,
    pub(crate) event_ids: EventIdPool,
    pub(crate) consumer: Option<Arc<dyn EventConsumer>>,
}

#[inline]
pub(crate) fn monitor_name(monitor: &dyn Monitor) -> &str {
    match monitor.identifier() {
        "" => "Unknown",
        id => id,
    }
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            monitors: Vec::new(),
            event_ids: EventIdPool::new(),
            consumer: None,
        }
    }

    #[inline]
    pub(crate) fn reserve_initial(&mut self) {
        self.monitors
            .reserve(INITIAL_MONITOR_CAPACITY.saturating_sub(self.monitors.len()));
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.monitors.len()
    }

    #[inline]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.monitors.iter().any(|m| m.identifier() == id)
    }

    #[inline]
    pub(crate) fn push(&mut self, monitor: Arc<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    /// Disables and unlinks the specified monitor, returning it so that it
    /// can be dropped after the lock is released.
    ///
    /// The last monitor takes the place of the removed one, order is only
    /// meaningful for readability of the logs.
    pub(crate) fn remove(&mut self, monitor: &dyn Monitor) -> Option<Arc<dyn Monitor>> {
        let index = self
            .monitors
            .iter()
            .position(|m| std::ptr::addr_eq(Arc::as_ptr(m), std::ptr::from_ref(monitor)))?;

        self.monitors[index].set_enabled(false);
        Some(self.monitors.swap_remove(index))
    }

    /// Unlinks every monitor, without disabling them
    #[inline]
    pub(crate) fn take_all(&mut self) -> Vec<Arc<dyn Monitor>> {
        std::mem::take(&mut self.monitors)
    }

    #[inline]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn Monitor>> {
        self.monitors.iter()
    }
}
