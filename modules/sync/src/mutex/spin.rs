use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use super::MutexSupport;

/// A spinlock generic over [`MutexSupport`], the hook that runs before the
/// spin loop and when the guard drops (e.g. disabling interrupts for
/// [`super::SpinNoIrqLock`]).
pub struct SpinMutex<T: ?Sized, S: MutexSupport> {
    locked: AtomicBool,
    _marker: PhantomData<S>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send, S: MutexSupport> Sync for SpinMutex<T, S> {}
unsafe impl<T: ?Sized + Send, S: MutexSupport> Send for SpinMutex<T, S> {}

impl<T, S: MutexSupport> SpinMutex<T, S> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            _marker: PhantomData,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized, S: MutexSupport> SpinMutex<T, S> {
    pub fn lock(&self) -> SpinMutexGuard<'_, T, S> {
        let mut guard_data = S::before_lock();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Release the `before_lock` side effect (e.g. re-enable
            // interrupts) while spinning so a held lock elsewhere can make
            // progress, then reacquire it before the next attempt.
            S::after_unlock(&mut guard_data);
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
            guard_data = S::before_lock();
        }
        SpinMutexGuard {
            mutex: self,
            guard_data,
        }
    }

    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T, S>> {
        let mut guard_data = S::before_lock();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinMutexGuard {
                mutex: self,
                guard_data,
            })
        } else {
            S::after_unlock(&mut guard_data);
            None
        }
    }

    /// # Safety
    /// The caller must hold the lock (or otherwise guarantee exclusive
    /// access) for the duration of the returned reference's use.
    pub unsafe fn unsafe_get(&self) -> &mut T {
        &mut *self.data.get()
    }
}

impl<T: ?Sized + Default, S: MutexSupport> Default for SpinMutex<T, S> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct SpinMutexGuard<'a, T: ?Sized, S: MutexSupport> {
    mutex: &'a SpinMutex<T, S>,
    guard_data: S::GuardData,
}

impl<T: ?Sized, S: MutexSupport> Deref for SpinMutexGuard<'_, T, S> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized, S: MutexSupport> DerefMut for SpinMutexGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized, S: MutexSupport> Drop for SpinMutexGuard<'_, T, S> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        S::after_unlock(&mut self.guard_data);
    }
}
