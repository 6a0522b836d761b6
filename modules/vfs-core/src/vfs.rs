use alloc::sync::Arc;

use systype::{SysError, SysResult};

use crate::{
    dirent,
    flags::{DescriptorFlags, OpenFlags, SeekWhence},
    fs::FileSystem,
    handle::{Handle, MmCleanup},
    lock::{FsLockGuard, HandleLockGuard},
    mount::MountTable,
    refcount::{reclaim, RefCounted},
    resolve::{resolve, ResolvedPath},
    stat::Stat,
    usermem::{UserMemory, UserSlice},
};

/// The public VFS surface (component F). Owns nothing but the mount table;
/// every other piece of state (refcounts, locks) lives on the filesystem
/// and handle objects themselves, exactly as the donor's free-function
/// `vfs_*` API operates on `filesystem`/`fs_handle` pointers rather than on
/// a singleton "VFS instance". Kept as a struct (rather than free functions
/// over a global) only so a caller can run more than one namespace, e.g.
/// one per container, without reaching for a `static`.
pub struct Vfs {
    mounts: MountTable,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub const fn new() -> Self {
        Self {
            mounts: MountTable::new(),
        }
    }

    pub fn mount(&self, prefix: &str, fs: Arc<FileSystem>) -> SysResult<()> {
        self.mounts.mount(prefix, fs)
    }

    pub fn unmount(&self, prefix: &str) -> SysResult<()> {
        self.mounts.unmount(prefix)
    }

    /// `open(path, flags, mode) -> handle | err` (§4.F). Rejects `O_ASYNC`
    /// and `O_TMPFILE` before ever touching the mount table. On success the
    /// mount-lookup's retain is transferred to the handle permanently
    /// (leaked, never released here); on any failure it is released when
    /// the local `fs` guard drops.
    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> SysResult<Arc<Handle>> {
        assert_preemption_precondition();
        log::debug!("[Vfs::open] {path} flags={flags:?}");

        if flags.contains(OpenFlags::O_ASYNC) {
            return Err(SysError::EINVAL);
        }
        if flags.contains(OpenFlags::O_TMPFILE) {
            return Err(SysError::EOPNOTSUPP);
        }

        let (fs, residual) = self.mounts.resolve_mount(path)?;

        // Scoped so the filesystem lock is released before we decide
        // whether the mount-lookup retain transfers to the handle or gets
        // released with `fs`'s own drop below.
        let result = {
            let _lock = FsLockGuard::exclusive(&fs);
            resolve(fs.as_arc().clone(), &residual).and_then(|rp| fs.ops().open(&rp, flags, mode))
        };

        match result {
            Ok(handle) => {
                handle.set_close_on_exec(flags.contains(OpenFlags::O_CLOEXEC));
                let _ = fs.leak();
                Ok(handle)
            }
            Err(e) => {
                log::warn!("[Vfs::open] {path} failed: {e:?}");
                Err(e)
            }
        }
    }

    /// `close(handle)` (§4.D). Permitted to run with preemption disabled —
    /// the one documented exception in §4.E/§5 — to cooperate with process
    /// teardown; callers invoking this during teardown must say so at the
    /// call site rather than relying on this function to check for them.
    pub fn close(&self, handle: Arc<Handle>, mm: &dyn MmCleanup) {
        log::debug!("[Vfs::close] dev={:?}", handle.fs.dev_id);
        mm.remove_mappings_of(&handle);
        handle.fs.ops().close(&handle);
        let fs = handle.fs.clone();
        drop(handle);
        drop(reclaim(fs));
    }

    /// `dup(handle) -> handle | err` (§4.D). The duplicate inherits
    /// open-flags but not descriptor-flags, and takes its own retain on
    /// the filesystem.
    pub fn dup(&self, handle: &Handle) -> SysResult<Arc<Handle>> {
        assert_preemption_precondition();
        log::debug!("[Vfs::dup] dev={:?}", handle.fs.dev_id);
        let dup = handle.fs.ops().dup(handle).ok_or(SysError::EBADF)?.inspect_err(|e| {
            log::warn!("[Vfs::dup] failed: {e:?}");
        })?;
        dup.set_descriptor_flags(DescriptorFlags::empty());
        handle.fs.refcount().retain();
        Ok(dup)
    }

    /// `read(handle, buf, n) -> bytes | err` (§4.F). Dispatched under the
    /// handle shared lock.
    pub fn read(
        &self,
        handle: &Handle,
        user_buf: UserSlice<'_>,
        user_mem: &dyn UserMemory,
    ) -> SysResult<usize> {
        assert_preemption_precondition();
        log::trace!("[Vfs::read] dev={:?} n={}", handle.fs.dev_id, user_buf.len());
        if !handle.open_flags.readable() {
            return Err(SysError::EBADF);
        }
        let _guard = HandleLockGuard::shared(handle);
        let mut scratch = alloc::vec![0u8; user_buf.len()];
        let n = handle.ops().read(handle, &mut scratch).ok_or(SysError::EBADF)?.inspect_err(|e| {
            log::warn!("[Vfs::read] driver error: {e:?}");
        })?;
        user_mem.copy_out(user_buf, &scratch[..n])?;
        Ok(n)
    }

    /// `write(handle, buf, n) -> bytes | err` (§4.F). Dispatched under the
    /// handle exclusive lock.
    pub fn write(
        &self,
        handle: &Handle,
        user_buf: UserSlice<'_>,
        user_mem: &dyn UserMemory,
    ) -> SysResult<usize> {
        assert_preemption_precondition();
        log::trace!("[Vfs::write] dev={:?} n={}", handle.fs.dev_id, user_buf.len());
        if !handle.open_flags.writable() {
            return Err(SysError::EBADF);
        }
        let _guard = HandleLockGuard::exclusive(handle);
        let mut scratch = alloc::vec![0u8; user_buf.len()];
        user_mem.copy_in(&mut scratch, user_buf)?;
        let n = handle.ops().write(handle, &scratch).ok_or(SysError::EBADF)?.inspect_err(|e| {
            log::warn!("[Vfs::write] driver error: {e:?}");
        })?;
        Ok(n)
    }

    /// `seek(handle, off, whence) -> new-off | err` (§4.F).
    pub fn seek(&self, handle: &Handle, offset: i64, whence: i32) -> SysResult<usize> {
        assert_preemption_precondition();
        let whence = SeekWhence::from_raw(whence).ok_or(SysError::EINVAL)?;
        let _guard = HandleLockGuard::shared(handle);
        handle.ops().seek(handle, offset, whence).ok_or(SysError::ESPIPE)?
    }

    /// `ioctl(handle, req, argp) -> int | err` (§4.F).
    pub fn ioctl(&self, handle: &Handle, request: usize, argp: usize) -> SysResult<usize> {
        assert_preemption_precondition();
        let _guard = HandleLockGuard::exclusive(handle);
        handle.ops().ioctl(handle, request, argp).ok_or(SysError::ENOTTY)?
    }

    /// `fcntl(handle, cmd, arg) -> int | err` (§4.F).
    pub fn fcntl(&self, handle: &Handle, cmd: i32, arg: usize) -> SysResult<usize> {
        assert_preemption_precondition();
        let _guard = HandleLockGuard::exclusive(handle);
        handle.ops().fcntl(handle, cmd, arg).ok_or(SysError::EINVAL)?
    }

    /// `fstat(handle) -> stat | err` (§4.F). Shared handle lock, delegates
    /// to filesystem-scope `fstat`.
    pub fn fstat(&self, handle: &Handle) -> SysResult<Stat> {
        assert_preemption_precondition();
        let _guard = HandleLockGuard::shared(handle);
        handle.fs.ops().fstat(handle)
    }

    /// `stat(path) -> stat | err` (§4.F): open read-only, fstat, close.
    /// Unlike the donor source (§9), this propagates `fstat`'s real result
    /// instead of unconditionally returning success — see DESIGN.md for
    /// why that anomaly is not reproduced.
    pub fn stat(&self, path: &str, mm: &dyn MmCleanup) -> SysResult<Stat> {
        let handle = self.open(path, OpenFlags::O_RDONLY, 0)?;
        let result = self.fstat(&handle);
        self.close(handle, mm);
        result
    }

    /// Shared shape of `mkdir`/`rmdir`/`unlink`: resolve the mount, gate on
    /// the read/write flag, resolve the path under the filesystem
    /// exclusive lock, dispatch to the optional driver hook (substituting
    /// `missing_hook_err` when absent), and always release the
    /// mount-lookup reference before returning.
    fn namespace_mutate(
        &self,
        path: &str,
        missing_hook_err: SysError,
        op: impl FnOnce(&FileSystem, &ResolvedPath) -> Option<SysResult<()>>,
    ) -> SysResult<()> {
        assert_preemption_precondition();
        let (fs, residual) = self.mounts.resolve_mount(path)?;
        if !fs.read_write {
            return Err(SysError::EROFS);
        }
        let _lock = FsLockGuard::exclusive(&fs);
        resolve(fs.as_arc().clone(), &residual)
            .and_then(|rp| op(&fs, &rp).unwrap_or(Err(missing_hook_err)))
            .inspect_err(|e| log::warn!("[Vfs::namespace_mutate] {path} failed: {e:?}"))
    }

    /// `mkdir(path, mode) -> err` (§4.F). Missing hook reports `EPERM`.
    pub fn mkdir(&self, path: &str, mode: u32) -> SysResult<()> {
        log::debug!("[Vfs::mkdir] {path}");
        self.namespace_mutate(path, SysError::EPERM, |fs, rp| fs.ops().mkdir(rp, mode))
    }

    /// `rmdir(path) -> err` (§4.F). Missing hook reports `EPERM`.
    pub fn rmdir(&self, path: &str) -> SysResult<()> {
        log::debug!("[Vfs::rmdir] {path}");
        self.namespace_mutate(path, SysError::EPERM, |fs, rp| fs.ops().rmdir(rp))
    }

    /// `unlink(path) -> err` (§4.F). Missing hook reports `EROFS`, not
    /// `EPERM` — the one asymmetry the donor source's vtable-null checks
    /// draw between `unlink` and `mkdir`/`rmdir`.
    pub fn unlink(&self, path: &str) -> SysResult<()> {
        log::debug!("[Vfs::unlink] {path}");
        self.namespace_mutate(path, SysError::EROFS, |fs, rp| fs.ops().unlink(rp))
    }

    /// `getdents(handle, user_buf, buf_size) -> bytes | err` (§4.G).
    /// Dispatched under the filesystem shared lock — getdents is a
    /// filesystem-scope, not handle-scope, operation per the lock matrix.
    pub fn getdents(
        &self,
        handle: &Handle,
        user_buf: UserSlice<'_>,
        user_mem: &dyn UserMemory,
    ) -> SysResult<usize> {
        assert_preemption_precondition();
        log::trace!("[Vfs::getdents] dev={:?} buf_size={}", handle.fs.dev_id, user_buf.len());
        let _lock = FsLockGuard::shared(&handle.fs);
        dirent::getdents(handle, user_buf, user_mem).inspect_err(|e| {
            log::warn!("[Vfs::getdents] failed: {e:?}");
        })
    }

    pub fn read_ready(&self, handle: &Handle) -> bool {
        let _guard = HandleLockGuard::shared(handle);
        handle.ops().read_ready(handle).unwrap_or(true)
    }

    pub fn write_ready(&self, handle: &Handle) -> bool {
        let _guard = HandleLockGuard::shared(handle);
        handle.ops().write_ready(handle).unwrap_or(true)
    }

    pub fn except_ready(&self, handle: &Handle) -> bool {
        let _guard = HandleLockGuard::shared(handle);
        handle.ops().except_ready(handle).unwrap_or(false)
    }

    /// `new_device_id() -> u32` (§4.F). Returns the next value of the
    /// process-wide device-id counter (component J, `device-core`).
    pub fn new_device_id(&self) -> u32 {
        device_core::new_device_id()
    }
}

#[inline]
fn assert_preemption_precondition() {
    crate::lock::assert_preemption_enabled(true);
}
