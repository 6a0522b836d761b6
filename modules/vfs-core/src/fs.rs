use alloc::boxed::Box;

use device_core::DevId;
use systype::SysResult;

use crate::{
    dirent::RawDirEntry, flags::OpenFlags, handle::Handle, refcount::{RefCount, RefCounted},
    resolve::ResolvedPath, stat::Stat,
};

/// The driver-provided filesystem-operations vtable (§3, §4). Every hook
/// here is invoked by the core with the filesystem's own lock already held
/// at the scope §4.E demands; a driver that has no use for a hook (locking
/// in particular) simply keeps the default.
///
/// `open`, `close`, `fstat` and `getdents`/`get_entry` are not optional:
/// every real driver has somewhere to create a handle, tear it down, stat
/// it and walk its namespace, so unlike the rest of the vtable these carry
/// no default implementation.
pub trait FileSystemOps: Send + Sync {
    /// Creates a handle for `rp`, dispatched under the filesystem exclusive
    /// lock. `rp.entry` may be `None` only when the caller is creating a
    /// new name (`O_CREAT`).
    fn open(&self, rp: &ResolvedPath, flags: OpenFlags, mode: u32) -> SysResult<alloc::sync::Arc<Handle>>;

    /// Tears down driver-private state for `handle`. The core has already
    /// released the handle's filesystem reference and removed any mm
    /// mappings by the time this returns control to [`crate::vfs::Vfs::close`].
    fn close(&self, handle: &Handle);

    /// Root entry of this filesystem, consulted once at the start of every
    /// path resolution (§4.C).
    fn root(&self) -> crate::entry::Entry;

    /// Looks up `name` as an immediate child of `parent`. Returns
    /// `Entry::none()` (not an error) when the name does not exist.
    fn get_entry(&self, parent: crate::entry::Ino, name: &str) -> SysResult<crate::entry::Entry>;

    /// Visits every entry of the directory named by `handle` in a stable,
    /// driver-defined order, calling `emit` once per entry. `emit` returns
    /// `Ok(true)` to continue, `Ok(false)` to stop early (buffer full), or
    /// an error to abort the whole call.
    fn getdents(
        &self,
        handle: &Handle,
        emit: &mut dyn FnMut(RawDirEntry<'_>) -> SysResult<bool>,
    ) -> SysResult<()>;

    fn fstat(&self, handle: &Handle) -> SysResult<Stat>;

    fn dup(&self, _handle: &Handle) -> Option<SysResult<alloc::sync::Arc<Handle>>> {
        None
    }

    fn mkdir(&self, _rp: &ResolvedPath, _mode: u32) -> Option<SysResult<()>> {
        None
    }

    fn rmdir(&self, _rp: &ResolvedPath) -> Option<SysResult<()>> {
        None
    }

    fn unlink(&self, _rp: &ResolvedPath) -> Option<SysResult<()>> {
        None
    }

    fn fs_shlock(&self) {}
    fn fs_shunlock(&self) {}
    fn fs_exlock(&self) {}
    fn fs_exunlock(&self) {}
}

/// The mounted filesystem object (§3 "Filesystem"). Carries the device
/// identity, the read/write gate that namespace-mutating operations check,
/// the driver vtable, and the manual [`RefCount`] the mount table and every
/// open handle retain against.
pub struct FileSystem {
    pub dev_id: DevId,
    pub read_write: bool,
    ops: Box<dyn FileSystemOps>,
    refcount: RefCount,
}

impl FileSystem {
    pub fn new(dev_id: DevId, read_write: bool, ops: Box<dyn FileSystemOps>) -> Self {
        Self {
            dev_id,
            read_write,
            ops,
            refcount: RefCount::new(0),
        }
    }

    pub fn ops(&self) -> &dyn FileSystemOps {
        self.ops.as_ref()
    }
}

impl RefCounted for FileSystem {
    fn refcount(&self) -> &RefCount {
        &self.refcount
    }
}
