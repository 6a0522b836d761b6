bitflags::bitflags! {
    /// `open(2)` flags, defined in `<bits/fcntl-linux.h>`. The access-mode
    /// bits (`O_RDONLY`/`O_WRONLY`/`O_RDWR`) are not independent flags —
    /// `bitflags` does not encourage a zero-valued flag, so callers should
    /// use [`OpenFlags::readable`]/[`OpenFlags::writable`] rather than
    /// testing `O_RDONLY` directly.
    #[derive(Debug, Clone, Copy)]
    pub struct OpenFlags: i32 {
        const O_RDONLY      = 0;
        const O_WRONLY      = 1;
        const O_RDWR        = 2;
        const O_ACCMODE     = 3;
        const O_CREAT       = 0o100;
        const O_EXCL        = 0o200;
        const O_NOCTTY      = 0o400;
        const O_TRUNC       = 0o1000;
        const O_APPEND      = 0o2000;
        const O_NONBLOCK    = 0o4000;
        const O_DSYNC       = 0o10000;
        const O_DIRECTORY   = 0o200000;
        const O_NOFOLLOW    = 0o400000;
        const O_CLOEXEC     = 0o2000000;
        const O_ASYNC       = 0o20000;
        const O_DIRECT      = 0o40000;
        const O_LARGEFILE   = 0o100000;
        const O_NOATIME     = 0o1000000;
        const O_PATH        = 0o10000000;
        const O_TMPFILE     = 0o20200000;
    }
}

impl OpenFlags {
    pub fn readable(&self) -> bool {
        !self.contains(OpenFlags::O_WRONLY) || self.contains(OpenFlags::O_RDWR)
    }

    pub fn writable(&self) -> bool {
        self.contains(OpenFlags::O_WRONLY) || self.contains(OpenFlags::O_RDWR)
    }
}

bitflags::bitflags! {
    /// Per-descriptor flags, as opposed to the open-file-description flags
    /// carried in [`OpenFlags`]. Only `FD_CLOEXEC` exists in this ABI.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DescriptorFlags: i32 {
        const CLOEXEC = 1;
    }
}

/// `lseek(2)` whence values this layer recognizes. Any other raw whence
/// value is rejected with `EINVAL` before it reaches here.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SeekWhence {
    Begin,
    Current,
    End,
}

impl SeekWhence {
    /// `SEEK_SET` / `SEEK_CUR` / `SEEK_END` as defined by `<unistd.h>`.
    pub fn from_raw(whence: i32) -> Option<Self> {
        match whence {
            0 => Some(Self::Begin),
            1 => Some(Self::Current),
            2 => Some(Self::End),
            _ => None,
        }
    }
}
