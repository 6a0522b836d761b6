use crate::{fs::FileSystem, handle::Handle};

/// Asserts the `is_preemption_enabled()` precondition §4.E/§5 places on
/// every VFS entry point except `close`. A no-op outside debug builds,
/// mirroring the donor's `NO_TEST_ASSERT` — this is an internal-invariant
/// check, not something a caller can trigger by mistake, so it costs
/// nothing in a release kernel.
///
/// The caller supplies the current preemption state; this crate has no way
/// to read it itself (that lives in the scheduler, out of scope per §1).
#[inline]
pub fn assert_preemption_enabled(enabled: bool) {
    debug_assert!(enabled, "VFS entry point requires preemption enabled");
}

/// Filesystem-scope and handle-scope locking dispatch (component E). Each
/// function simply calls through to the corresponding optional driver hook
/// and is a no-op when the driver did not provide one — "the driver has
/// declared it unnecessary" (§4.E). The core owns no mutex of its own here;
/// the lock *is* the driver hook.
pub fn fs_shlock(fs: &FileSystem) {
    fs.ops().fs_shlock();
}

pub fn fs_shunlock(fs: &FileSystem) {
    fs.ops().fs_shunlock();
}

pub fn fs_exlock(fs: &FileSystem) {
    fs.ops().fs_exlock();
}

pub fn fs_exunlock(fs: &FileSystem) {
    fs.ops().fs_exunlock();
}

pub fn shlock(handle: &Handle) {
    handle.ops().shlock(handle);
}

pub fn shunlock(handle: &Handle) {
    handle.ops().shunlock(handle);
}

pub fn exlock(handle: &Handle) {
    handle.ops().exlock(handle);
}

pub fn exunlock(handle: &Handle) {
    handle.ops().exunlock(handle);
}

/// RAII guard pairing an acquire with its release, so every dispatch entry
/// point in [`crate::vfs`] releases on every exit path (including error
/// returns via `?`) without repeating the unlock call at each early return.
pub struct FsLockGuard<'a> {
    fs: &'a FileSystem,
    exclusive: bool,
}

impl<'a> FsLockGuard<'a> {
    pub fn shared(fs: &'a FileSystem) -> Self {
        fs_shlock(fs);
        Self {
            fs,
            exclusive: false,
        }
    }

    pub fn exclusive(fs: &'a FileSystem) -> Self {
        fs_exlock(fs);
        Self {
            fs,
            exclusive: true,
        }
    }
}

impl Drop for FsLockGuard<'_> {
    fn drop(&mut self) {
        if self.exclusive {
            fs_exunlock(self.fs);
        } else {
            fs_shunlock(self.fs);
        }
    }
}

pub struct HandleLockGuard<'a> {
    handle: &'a Handle,
    exclusive: bool,
}

impl<'a> HandleLockGuard<'a> {
    pub fn shared(handle: &'a Handle) -> Self {
        shlock(handle);
        Self {
            handle,
            exclusive: false,
        }
    }

    pub fn exclusive(handle: &'a Handle) -> Self {
        exlock(handle);
        Self {
            handle,
            exclusive: true,
        }
    }
}

impl Drop for HandleLockGuard<'_> {
    fn drop(&mut self) {
        if self.exclusive {
            exunlock(self.handle);
        } else {
            shunlock(self.handle);
        }
    }
}
