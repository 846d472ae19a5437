//! # IDs
//!
//! Typed identifiers, unique within one execution of the program. History is
//! memory-only and dies with the session, so these never need to be stable across
//! runs — a single process-wide counter is enough.

static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// ID guaranteed unique within this execution of the program, namespaced by `T`.
///
/// Values are allocated from one shared counter, so IDs of *different* namespaces
/// never collide numerically either — convenient for logging.
pub struct EphemeralId<T> {
    id: std::num::NonZeroU64,
    // `fn() -> T` rather than `T`: keeps the marker Send + Sync + 'static
    // regardless of what T is, without unsafe impls.
    _namespace: std::marker::PhantomData<fn() -> T>,
}

impl<T> EphemeralId<T> {
    /// Allocate the next unique ID.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let Some(id) = std::num::NonZeroU64::new(raw) else {
            // Exhausting 2^64 - 1 IDs means the counter wrapped. Allocating further
            // could hand out duplicates, which silently breaks undo bookkeeping.
            log::error!("{} ID counter wrapped! Aborting!", std::any::type_name::<T>());
            log::logger().flush();
            std::process::abort();
        };
        Self {
            id,
            _namespace: std::marker::PhantomData,
        }
    }
    /// Raw numeric value.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
}

impl<T> Default for EphemeralId<T> {
    fn default() -> Self {
        Self::next()
    }
}
// Manual impls - derives would needlessly bound on T.
impl<T> Clone for EphemeralId<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for EphemeralId<T> {}
impl<T> PartialEq for EphemeralId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for EphemeralId<T> {}
impl<T> std::hash::Hash for EphemeralId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T> std::fmt::Debug for EphemeralId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short type name only - the full path is noise in logs.
        let name = std::any::type_name::<T>().rsplit("::").next().unwrap_or("?");
        write!(f, "{name}#{}", self.id)
    }
}
