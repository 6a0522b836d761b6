use device_core::DevId;

/// Driver-owned object identity. Never dereferenced by the core; compared
/// only for identity and echoed back into `Stat`/`getdents` output.
pub type Ino = u64;

/// Result of a single path-component lookup.
///
/// `EntryType::None` is not a filesystem object kind at all, it is the
/// explicit "nothing lives under this name" result a driver's `get_entry`
/// returns instead of an error, so the resolver can tell "parent exists,
/// child doesn't" apart from "parent doesn't exist".
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum EntryType {
    None = 0,
    File,
    Dir,
    SymLink,
    CharDevice,
    BlockDevice,
    Pipe,
}

impl EntryType {
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }

    /// `d_type` code for the host ABI's 64-bit dirent (see `<dirent.h>`).
    pub const fn dirent_type(self) -> u8 {
        match self {
            Self::File => 8,        // DT_REG
            Self::Dir => 4,         // DT_DIR
            Self::SymLink => 10,    // DT_LNK
            Self::CharDevice => 2,  // DT_CHR
            Self::BlockDevice => 6, // DT_BLK
            Self::Pipe => 1,        // DT_FIFO
            Self::None => unreachable!("a live directory entry is never of type none"),
        }
    }
}

/// A single path-component lookup result: (inode, type, auxiliary driver
/// fields). `ino`/`dev_id` are unset when `etype` is `None`.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub ino: Option<Ino>,
    pub etype: EntryType,
    pub dev_id: Option<DevId>,
}

impl Entry {
    pub const fn none() -> Self {
        Self {
            ino: None,
            etype: EntryType::None,
            dev_id: None,
        }
    }

    pub const fn new(ino: Ino, etype: EntryType) -> Self {
        Self {
            ino: Some(ino),
            etype,
            dev_id: None,
        }
    }

    pub const fn with_dev_id(mut self, dev_id: DevId) -> Self {
        self.dev_id = Some(dev_id);
        self
    }

    pub const fn is_none(&self) -> bool {
        self.etype.is_none()
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::none()
    }
}
