use alloc::sync::Arc;
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use systype::SysResult;

use crate::{
    flags::{DescriptorFlags, OpenFlags, SeekWhence},
    fs::FileSystem,
};

/// A source a blocking poller waits on when a driver reports "not ready"
/// from [`FileOps::read_ready`]/[`write_ready`]/[`except_ready`]. Opaque to
/// the core: it is handed back to whatever scheduler/poll machinery the
/// caller runs, which is out of scope for this crate (§1).
pub struct WaitSource(pub usize);

/// The driver-provided file-operations vtable (§3, §4.E/§4.F). Every hook
/// returns `None` by default, which the dispatch layer in [`crate::vfs`]
/// turns into the operation's documented fallback error — the same "a
/// missing hook has defined fallback semantics" contract §4.F describes for
/// the C vtable this is modeled on.
pub trait FileOps: Send + Sync {
    fn read(&self, _handle: &Handle, _buf: &mut [u8]) -> Option<SysResult<usize>> {
        None
    }

    fn write(&self, _handle: &Handle, _buf: &[u8]) -> Option<SysResult<usize>> {
        None
    }

    fn seek(&self, _handle: &Handle, _offset: i64, _whence: SeekWhence) -> Option<SysResult<usize>> {
        None
    }

    fn ioctl(&self, _handle: &Handle, _request: usize, _argp: usize) -> Option<SysResult<usize>> {
        None
    }

    fn fcntl(&self, _handle: &Handle, _cmd: i32, _arg: usize) -> Option<SysResult<usize>> {
        None
    }

    fn exlock(&self, _handle: &Handle) {}
    fn exunlock(&self, _handle: &Handle) {}
    fn shlock(&self, _handle: &Handle) {}
    fn shunlock(&self, _handle: &Handle) {}

    fn read_ready(&self, _handle: &Handle) -> Option<bool> {
        None
    }
    fn write_ready(&self, _handle: &Handle) -> Option<bool> {
        None
    }
    fn except_ready(&self, _handle: &Handle) -> Option<bool> {
        None
    }

    fn read_cond(&self, _handle: &Handle) -> Option<WaitSource> {
        None
    }
    fn write_cond(&self, _handle: &Handle) -> Option<WaitSource> {
        None
    }
}

/// Per-open-file state (§3 "Open handle"). `fs` is a plain `Arc`, not a
/// [`crate::refcount::Retained`] guard: the retain already happened at the
/// mount-lookup step inside [`crate::vfs::Vfs::open`] and was *leaked* into
/// this field (see `refcount::Retained::leak`), so constructing a `Handle`
/// never performs an extra retain of its own. `close` reclaims it exactly
/// once.
pub struct Handle {
    pub fs: Arc<FileSystem>,
    ops: alloc::boxed::Box<dyn FileOps>,
    pub open_flags: OpenFlags,
    descriptor_flags: AtomicI32,
    /// Current byte position for `seek`/`read`/`write`, and — doing double
    /// duty exactly as `fs_handle_base::pos` does in the donor source —
    /// the logical index of the next directory entry `getdents` should
    /// return.
    pub pos: AtomicUsize,
    pub driver_private: usize,
}

impl Handle {
    pub fn new(
        fs: Arc<FileSystem>,
        ops: alloc::boxed::Box<dyn FileOps>,
        open_flags: OpenFlags,
        driver_private: usize,
    ) -> Self {
        Self {
            fs,
            ops,
            open_flags,
            descriptor_flags: AtomicI32::new(0),
            pos: AtomicUsize::new(0),
            driver_private,
        }
    }

    pub fn ops(&self) -> &dyn FileOps {
        self.ops.as_ref()
    }

    pub fn descriptor_flags(&self) -> DescriptorFlags {
        DescriptorFlags::from_bits_truncate(self.descriptor_flags.load(Ordering::Relaxed))
    }

    pub fn set_descriptor_flags(&self, flags: DescriptorFlags) {
        self.descriptor_flags.store(flags.bits(), Ordering::Relaxed);
    }

    pub fn set_close_on_exec(&self, set: bool) {
        let mut flags = self.descriptor_flags();
        flags.set(DescriptorFlags::CLOEXEC, set);
        self.set_descriptor_flags(flags);
    }
}

/// The process-table collaborator contract §6 describes for `close`:
/// "a routine to remove all memory mappings referring to a closing
/// handle". Modeled as a trait so `vfs-core` stays decoupled from the
/// process/mm crates exactly as the donor workspace's `vfs-core` never
/// imports its process module; a no-op implementation is a valid choice
/// for a caller with no mmap support.
pub trait MmCleanup {
    fn remove_mappings_of(&self, handle: &Handle);
}

impl MmCleanup for () {
    fn remove_mappings_of(&self, _handle: &Handle) {}
}
