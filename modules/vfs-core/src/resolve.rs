use alloc::{string::String, sync::Arc};

use systype::{SysError, SysResult};

use crate::{
    entry::Entry,
    fs::FileSystem,
};

/// The triple a path walk produces: the filesystem it ran against, the
/// final lookup result, and the last path component (as a byte range into
/// the input, per §3/§4.C — reproduced here as an owned `String` since the
/// core has no reason to fight the borrow checker over a string that is
/// cheap to copy and outlives a single dispatch call either way).
///
/// `parent_ino` is not named as a field in the distilled §3 tuple, but the
/// original resolver (`vfs_resolve`'s `idir`) tracks it throughout the walk
/// regardless — a driver's `mkdir`/`open(O_CREAT)` has nowhere else to
/// learn which directory a fresh name belongs under once `entry` is
/// negative. Carrying it explicitly here is the Rust-shaped equivalent.
pub struct ResolvedPath {
    pub fs: Arc<FileSystem>,
    pub entry: Entry,
    pub parent_ino: crate::entry::Ino,
    pub last_comp: String,
}

/// Walks `path` (`path[0] == '/'`, no `..`/`.` components — the in-kernel
/// caller normalizes those before reaching the VFS) inside `fs`, starting
/// from the driver's root entry and calling `get_entry` once per
/// intermediate component (§4.C). Performs no locking of its own; the
/// caller holds the filesystem lock for the whole resolution.
pub fn resolve(fs: Arc<FileSystem>, path: &str) -> SysResult<ResolvedPath> {
    debug_assert!(path.starts_with('/'), "vfs paths are always absolute");
    let root = fs.ops().root();

    let root_ino = root.ino.expect("root entry must resolve to an inode");

    if path == "/" {
        return Ok(ResolvedPath {
            fs,
            entry: root,
            parent_ino: root_ino,
            last_comp: String::new(),
        });
    }

    let trailing_slash = path.ends_with('/');
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    let mut components = trimmed.split('/').peekable();

    let mut dir_ino = root_ino;
    let mut last_comp = "";

    loop {
        let comp = components.next().expect("non-root path has at least one component");
        let is_last = components.peek().is_none();

        if !is_last {
            let entry = fs.ops().get_entry(dir_ino, comp)?;
            if entry.is_none() {
                log::debug!("[resolve] {comp} not found while walking {path}");
                return Err(SysError::ENOENT);
            }
            dir_ino = entry.ino.expect("a present entry always carries an inode");
            continue;
        }

        // Final component.
        let entry = fs.ops().get_entry(dir_ino, comp)?;

        if trailing_slash {
            if entry.is_none() {
                // Parent exists, final name does not: the caller (e.g.
                // `mkdir`) gets the parent back with a negative entry.
                return Ok(ResolvedPath {
                    fs,
                    entry: Entry::none(),
                    parent_ino: dir_ino,
                    last_comp: String::from(comp),
                });
            }
            if !entry.etype.is_dir() {
                return Err(SysError::ENOTDIR);
            }
        }

        last_comp = comp;
        return Ok(ResolvedPath {
            fs,
            entry,
            parent_ino: dir_ino,
            last_comp: String::from(last_comp),
        });
    }
}

#[cfg(test)]
mod tests {
    use alloc::{boxed::Box, collections::BTreeMap};

    use device_core::{DevId, DeviceMajor};
    use sync::mutex::SpinNoIrqLock;

    use super::*;
    use crate::{
        dirent::RawDirEntry,
        entry::{EntryType, Ino},
        flags::OpenFlags,
        fs::FileSystemOps,
        handle::Handle,
        stat::Stat,
    };

    /// A minimal two-level directory tree: `/` containing `x`, `x`
    /// containing `y` (a file). Enough to exercise every resolver branch in
    /// §8 property 3 without pulling in the full reference driver.
    struct TinyFs {
        // ino -> (parent ino, name, type, children)
        nodes: SpinNoIrqLock<BTreeMap<Ino, (EntryType, BTreeMap<String, Ino>)>>,
    }

    impl TinyFs {
        fn new() -> Arc<FileSystem> {
            let mut nodes = BTreeMap::new();
            let mut root_children = BTreeMap::new();
            root_children.insert(String::from("x"), 1);
            nodes.insert(0, (EntryType::Dir, root_children));
            let mut x_children = BTreeMap::new();
            x_children.insert(String::from("y"), 2);
            nodes.insert(1, (EntryType::Dir, x_children));
            nodes.insert(2, (EntryType::File, BTreeMap::new()));
            Arc::new(FileSystem::new(
                DevId {
                    major: DeviceMajor::Misc,
                    minor: 0,
                },
                false,
                Box::new(Self {
                    nodes: SpinNoIrqLock::new(nodes),
                }),
            ))
        }
    }

    impl FileSystemOps for TinyFs {
        fn open(&self, _rp: &ResolvedPath, _flags: OpenFlags, _mode: u32) -> SysResult<Arc<Handle>> {
            Err(SysError::ENOSYS)
        }
        fn close(&self, _handle: &Handle) {}
        fn root(&self) -> Entry {
            Entry::new(0, EntryType::Dir)
        }
        fn get_entry(&self, parent: Ino, name: &str) -> SysResult<Entry> {
            let nodes = self.nodes.lock();
            let (_, children) = nodes.get(&parent).ok_or(SysError::ENOENT)?;
            Ok(match children.get(name) {
                Some(&ino) => Entry::new(ino, nodes.get(&ino).unwrap().0),
                None => Entry::none(),
            })
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

    #[test]
    fn root_resolves_with_empty_last_component() {
        let fs = TinyFs::new();
        let rp = resolve(fs, "/").unwrap();
        assert_eq!(rp.last_comp, "");
        assert!(rp.entry.etype.is_dir());
    }

    #[test]
    fn existing_file_resolves_to_its_entry() {
        let fs = TinyFs::new();
        let rp = resolve(fs, "/x/y").unwrap();
        assert_eq!(rp.last_comp, "y");
        assert_eq!(rp.entry.etype, EntryType::File);
    }

    #[test]
    fn trailing_slash_on_a_file_is_not_a_directory() {
        let fs = TinyFs::new();
        assert_eq!(resolve(fs, "/x/y/"), Err(SysError::ENOTDIR));
    }

    #[test]
    fn trailing_slash_on_a_missing_name_returns_a_negative_entry() {
        let fs = TinyFs::new();
        let rp = resolve(fs, "/x/nope/").unwrap();
        assert!(rp.entry.is_none());
        assert_eq!(rp.last_comp, "nope");
    }

    #[test]
    fn missing_intermediate_component_is_not_found() {
        let fs = TinyFs::new();
        assert_eq!(resolve(fs, "/nope/y"), Err(SysError::ENOENT));
    }
}
