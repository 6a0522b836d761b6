use alloc::sync::Arc;
use core::{
    mem::ManuallyDrop,
    ops::Deref,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Atomic retain/release counter embedded in a shared kernel object (a
/// mounted filesystem, an open handle). `Relaxed` ordering is enough: this
/// is a single-node kernel, so the only concern is the read-modify-write
/// itself racing, not cross-CPU visibility of unrelated writes.
#[derive(Debug, Default)]
pub struct RefCount(AtomicUsize);

impl RefCount {
    pub const fn new(initial: usize) -> Self {
        Self(AtomicUsize::new(initial))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn retain(&self) -> usize {
        let prev = self.0.fetch_add(1, Ordering::Relaxed);
        log_watched(self, "retain", prev + 1);
        prev
    }

    /// Asserts the prior value was strictly positive: releasing a refcount
    /// that was already at zero means a retain/release pair was unbalanced
    /// somewhere upstream, which is an internal invariant violation, not a
    /// user-induced error.
    pub fn release(&self) -> usize {
        let prev = self.0.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "refcount release without a matching retain");
        log_watched(self, "release", prev - 1);
        prev
    }
}

/// Address of a `RefCount` a caller wants transition logging for. A single
/// slot is enough for interactive debugging (watch one mount or handle at a
/// time) without paying for a table in the common case.
static WATCHED: AtomicUsize = AtomicUsize::new(0);

/// Registers `target` for `log::trace!` transition logging on every
/// subsequent `retain`/`release`.
pub fn watch(target: &RefCount) {
    WATCHED.store(target as *const _ as usize, Ordering::Relaxed);
}

pub fn unwatch() {
    WATCHED.store(0, Ordering::Relaxed);
}

fn log_watched(rc: &RefCount, op: &str, new_value: usize) {
    if WATCHED.load(Ordering::Relaxed) == rc as *const _ as usize {
        log::trace!("[refcount] {op} -> {new_value}");
    }
}

/// Types carrying an embedded [`RefCount`] that [`Retained`] can operate on.
pub trait RefCounted {
    fn refcount(&self) -> &RefCount;
}

/// An owning token that retains on construction and releases on scope exit,
/// so the "leak into handle at `open` / reclaim from handle at `close`"
/// discipline is enforced by the type system instead of by convention.
///
/// [`Retained::leak`] moves the already-retained reference out without
/// running `release`, handing ownership to whoever stores the resulting
/// `Arc` long-term (a `Handle`); [`reclaim`] is the inverse, taking such an
/// `Arc` back and wrapping it so the next drop releases exactly once.
pub struct Retained<T: RefCounted + ?Sized>(ManuallyDrop<Arc<T>>);

impl<T: RefCounted + ?Sized> Retained<T> {
    pub fn new(arc: Arc<T>) -> Self {
        arc.refcount().retain();
        Self(ManuallyDrop::new(arc))
    }

    pub fn as_arc(&self) -> &Arc<T> {
        &self.0
    }

    /// Leaks the retained reference into a raw `Arc`, skipping the
    /// corresponding `release` that a normal drop would perform. The caller
    /// becomes responsible for releasing it later via [`reclaim`].
    pub fn leak(mut self) -> Arc<T> {
        let arc = unsafe { ManuallyDrop::take(&mut self.0) };
        core::mem::forget(self);
        arc
    }
}

impl<T: RefCounted + ?Sized> Deref for Retained<T> {
    type Target = Arc<T>;
    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

impl<T: RefCounted + ?Sized> Drop for Retained<T> {
    fn drop(&mut self) {
        self.0.refcount().release();
        unsafe { ManuallyDrop::drop(&mut self.0) };
    }
}

/// Reclaims a reference previously handed off with [`Retained::leak`],
/// without an extra `retain` — the logical retain is the one that already
/// happened before the leak.
pub fn reclaim<T: RefCounted + ?Sized>(arc: Arc<T>) -> Retained<T> {
    Retained(ManuallyDrop::new(arc))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Obj(RefCount);
    impl RefCounted for Obj {
        fn refcount(&self) -> &RefCount {
            &self.0
        }
    }

    #[test]
    fn retain_release_balances() {
        let obj = Arc::new(Obj(RefCount::new(1)));
        assert_eq!(obj.refcount().get(), 1);
        let retained = Retained::new(obj.clone());
        assert_eq!(obj.refcount().get(), 2);
        drop(retained);
        assert_eq!(obj.refcount().get(), 1);
    }

    #[test]
    fn leak_then_reclaim_is_a_no_op_on_the_count() {
        let obj = Arc::new(Obj(RefCount::new(1)));
        let retained = Retained::new(obj.clone());
        assert_eq!(obj.refcount().get(), 2);
        let leaked = retained.leak();
        assert_eq!(obj.refcount().get(), 2);
        drop(reclaim(leaked));
        assert_eq!(obj.refcount().get(), 1);
    }

    #[test]
    #[should_panic(expected = "refcount release without a matching retain")]
    fn release_below_zero_asserts() {
        let rc = RefCount::new(0);
        rc.release();
    }
}
