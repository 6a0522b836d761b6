//! `cli`/`sti` abstraction for `SpinNoIrqLock`.
//!
//! Hosted test builds never actually execute privileged interrupt
//! instructions (there is no IDT to disable here, and doing so would fault
//! in ring 3); `cfg(test)` swaps in a plain atomic flag that preserves the
//! mutual-exclusion contract without the privileged side effect.

#[cfg(all(target_arch = "x86_64", not(test)))]
mod arch_impl {
    use x86_64::instructions::interrupts;

    #[inline]
    pub fn is_interrupt_enabled() -> bool {
        interrupts::are_enabled()
    }

    #[inline]
    pub fn enable_interrupt() {
        interrupts::enable();
    }

    #[inline]
    pub fn disable_interrupt() {
        interrupts::disable();
    }
}

#[cfg(any(not(target_arch = "x86_64"), test))]
mod arch_impl {
    use core::sync::atomic::{AtomicBool, Ordering};

    static INTERRUPT_ENABLED: AtomicBool = AtomicBool::new(true);

    #[inline]
    pub fn is_interrupt_enabled() -> bool {
        INTERRUPT_ENABLED.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn enable_interrupt() {
        INTERRUPT_ENABLED.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn disable_interrupt() {
        INTERRUPT_ENABLED.store(false, Ordering::Relaxed);
    }
}

pub use arch_impl::{disable_interrupt, enable_interrupt, is_interrupt_enabled};

/// Disables interrupts and resumes the interrupt state from before when it
/// gets dropped.
pub struct InterruptGuard {
    interrupt_before: bool,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let interrupt_before = is_interrupt_enabled();
        disable_interrupt();
        Self { interrupt_before }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.interrupt_before {
            enable_interrupt();
        }
    }
}
