use alloc::{string::String, sync::Arc, vec::Vec};

use systype::{SysError, SysResult};

use crate::{
    fs::FileSystem,
    refcount::{reclaim, RefCounted, Retained},
};
use sync::mutex::SpinNoIrqLock;

/// A binding between an absolute path prefix and a mounted filesystem
/// (§3 "Mount point"). `prefix` is canonical: it starts with `/` and never
/// carries a trailing `/` unless it is exactly `"/"`.
struct MountPoint {
    prefix: String,
    fs: Arc<FileSystem>,
}

/// The number of leading bytes of `path` that `prefix` matches, counting
/// only up to a component boundary: `/foo` matches `/foo` and `/foo/bar`
/// but not `/foobar` (§4.B).
fn mp_check_match(prefix: &str, path: &str) -> usize {
    if prefix == "/" {
        return 1;
    }
    if !path.starts_with(prefix) {
        return 0;
    }
    match path.as_bytes().get(prefix.len()) {
        None | Some(b'/') => prefix.len(),
        _ => 0,
    }
}

/// Registry of mount points (component B). A small, rarely-mutated
/// collection: insertion and removal take the whole-table lock, and so
/// does the linear scan a lookup performs, which doubles as the "cursor"
/// §4.B asks for — no mount can be removed mid-scan while the lock is held.
pub struct MountTable {
    mounts: SpinNoIrqLock<Vec<MountPoint>>,
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    pub const fn new() -> Self {
        Self {
            mounts: SpinNoIrqLock::new(Vec::new()),
        }
    }

    /// Registers `fs` at `prefix`. `prefix` must be canonical and must not
    /// collide with an existing mount point (§3 invariant).
    pub fn mount(&self, prefix: &str, fs: Arc<FileSystem>) -> SysResult<()> {
        debug_assert!(prefix == "/" || (prefix.starts_with('/') && !prefix.ends_with('/')));
        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|mp| mp.prefix == prefix) {
            return Err(SysError::EBUSY);
        }
        log::debug!("[MountTable::mount] {prefix} dev={:?}", fs.dev_id);
        Retained::new(fs.clone()).leak();
        mounts.push(MountPoint {
            prefix: String::from(prefix),
            fs,
        });
        Ok(())
    }

    /// Removes the mount point at `prefix`. Fails with `EBUSY` while the
    /// filesystem's refcount is above the one reference the mount point
    /// itself holds, i.e. while any handle into it is still open
    /// (testable property 10).
    pub fn unmount(&self, prefix: &str) -> SysResult<()> {
        let mut mounts = self.mounts.lock();
        let idx = mounts
            .iter()
            .position(|mp| mp.prefix == prefix)
            .ok_or(SysError::EINVAL)?;
        if mounts[idx].fs.refcount().get() > 1 {
            return Err(SysError::EBUSY);
        }
        let mp = mounts.remove(idx);
        log::debug!("[MountTable::unmount] {prefix}");
        drop(reclaim(mp.fs));
        Ok(())
    }

    /// Longest-prefix match of `path` against the registered mount points,
    /// returning the matched filesystem (retained on behalf of the caller —
    /// the caller must release it) and the residual path rooted at `/`
    /// inside that filesystem.
    pub fn resolve_mount(&self, path: &str) -> SysResult<(Retained<FileSystem>, String)> {
        debug_assert!(path.starts_with('/'));
        let mounts = self.mounts.lock();
        let mut best: Option<(&MountPoint, usize)> = None;
        for mp in mounts.iter() {
            let len = mp_check_match(&mp.prefix, path);
            if len > best.map_or(0, |(_, l)| l) {
                best = Some((mp, len));
            }
        }
        let (mp, matched_len) = best.ok_or(SysError::ENOENT)?;
        // The root prefix is itself the boundary slash: `mp_check_match`
        // reports it matching one byte so it still wins as the fallback
        // mount, but that byte must not be stripped from the residual or
        // every root-mounted lookup would lose its leading `/` (the
        // original backs up one byte for exactly this reason before
        // slicing, `original_source/kernel/fs/vfs.c:128`).
        let residual = if mp.prefix == "/" {
            String::from(path)
        } else if matched_len < path.len() {
            String::from(&path[matched_len..])
        } else {
            String::from("/")
        };
        Ok((Retained::new(mp.fs.clone()), residual))
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use device_core::{DevId, DeviceMajor};

    use super::*;
    use crate::{
        dirent::RawDirEntry,
        entry::{Entry, Ino},
        flags::OpenFlags,
        fs::FileSystemOps,
        handle::Handle,
        resolve::ResolvedPath,
        stat::Stat,
    };

    struct NullFs;
    impl FileSystemOps for NullFs {
        fn open(&self, _rp: &ResolvedPath, _flags: OpenFlags, _mode: u32) -> SysResult<Arc<Handle>> {
            Err(SysError::ENOSYS)
        }
        fn close(&self, _handle: &Handle) {}
        fn root(&self) -> Entry {
            Entry::new(0, crate::entry::EntryType::Dir)
        }
        fn get_entry(&self, _parent: Ino, _name: &str) -> SysResult<Entry> {
            Ok(Entry::none())
        }
        fn getdents(
            &self,
            _handle: &Handle,
            _emit: &mut dyn FnMut(RawDirEntry<'_>) -> SysResult<bool>,
        ) -> SysResult<()> {
            Ok(())
        }
        fn fstat(&self, _handle: &Handle) -> SysResult<Stat> {
            Err(SysError::ENOSYS)
        }
    }

    fn fs(minor: usize) -> Arc<FileSystem> {
        Arc::new(FileSystem::new(
            DevId {
                major: DeviceMajor::Misc,
                minor,
            },
            true,
            Box::new(NullFs),
        ))
    }

    #[test]
    fn longest_prefix_match() {
        let table = MountTable::new();
        table.mount("/", fs(0)).unwrap();
        table.mount("/a", fs(1)).unwrap();
        table.mount("/a/b", fs(2)).unwrap();

        let (root_fs, _) = table.resolve_mount("/z").unwrap();
        let (_, residual) = table.resolve_mount("/z").unwrap();
        assert_eq!(residual, "/z");
        drop(root_fs);

        let (_, residual) = table.resolve_mount("/a/bx").unwrap();
        assert_eq!(residual, "/bx");

        let (_, residual) = table.resolve_mount("/a/b/c/d").unwrap();
        assert_eq!(residual, "/c/d");
    }

    #[test]
    fn unmount_requires_refcount_of_one() {
        let table = MountTable::new();
        let f = fs(0);
        table.mount("/", f.clone()).unwrap();
        // The mount table's own retain puts the count at 1; a second,
        // simulated outstanding handle pushes it to 2.
        f.refcount().retain();
        assert_eq!(table.unmount("/"), Err(SysError::EBUSY));
        f.refcount().release();
        assert_eq!(table.unmount("/"), Ok(()));
    }
}
