use std::fmt;

/// The number of identifiers generated ahead of time for use on the fault path.
///
/// We never need more than two, the crash and a crash while handling that
/// crash, as the process terminates afterwards.
pub const EVENT_ID_POOL_SIZE: usize = 2;

/// The length of a hyphenated UUID, eg. `67e55044-10b1-426f-9247-bb680e5fe0c8`
const EVENT_ID_LEN: usize = 36;

/// A unique identifier for a crash event.
///
/// This is stored inline rather than as a `String` so that it can be copied
/// around on the fault path without allocating.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EventId([u8; EVENT_ID_LEN]);

impl EventId {
    /// Generates a new random identifier.
    ///
    /// This is **not** async signal safe, as it reads from the system's random
    /// number source.
    pub fn generate() -> Self {
        let mut buf = [0u8; EVENT_ID_LEN];
        uuid::Uuid::new_v4().hyphenated().encode_lower(&mut buf);
        Self(buf)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // The buffer is only ever filled with ASCII by `generate`
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventId").field(&self.as_str()).finish()
    }
}

/// A tiny pool of identifiers generated outside of the fault path so that
/// they can be handed out from inside it.
pub struct EventIdPool {
    ids: [EventId; EVENT_ID_POOL_SIZE],
    cursor: usize,
}

impl EventIdPool {
    pub fn new() -> Self {
        Self {
            ids: std::array::from_fn(|_| EventId::generate()),
            cursor: 0,
        }
    }

    /// Replaces every identifier in the pool with a fresh one and makes all
    /// of them available again.
    ///
    /// This is not async signal safe and must never be called while handling
    /// a fault.
    pub fn regenerate(&mut self) {
        for id in &mut self.ids {
            *id = EventId::generate();
        }
        self.cursor = 0;
    }

    /// Takes the next unused identifier, or `None` if the pool is exhausted.
    ///
    /// This is async signal safe.
    #[inline]
    pub fn take(&mut self) -> Option<EventId> {
        let id = *self.ids.get(self.cursor)?;
        self.cursor += 1;
        Some(id)
    }

    /// The number of identifiers that can still be taken
    #[inline]
    pub fn remaining(&self) -> usize {
        EVENT_ID_POOL_SIZE - self.cursor
    }
}

impl Default for EventIdPool {
    fn default() -> Self {
        Self::new()
    }
}
