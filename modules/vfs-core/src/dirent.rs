use core::sync::atomic::Ordering;

use systype::{SysError, SysResult};

use crate::{entry::EntryType, handle::Handle, usermem::{UserMemory, UserSlice}};

/// Fixed-size header of the wire-compatible 64-bit dirent (§6). `d_name`
/// follows immediately after, NUL-terminated, and is not part of this
/// struct so that `size_of::<DirentHeader>()` is exactly the fixed portion
/// §4.G's size computation adds the name and NUL to.
///
/// `packed`: the host ABI's `linux_dirent64` has `d_name` follow `d_type`
/// with no padding, so this struct must be exactly 19 bytes, not the 24
/// bytes a plain `repr(C)` would round up to for `u64` alignment.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Default)]
pub struct DirentHeader {
    pub d_ino: u64,
    pub d_off: u64,
    pub d_reclen: u16,
    pub d_type: u8,
}

const HEADER_LEN: usize = core::mem::size_of::<DirentHeader>();

/// One directory entry as a driver hands it to the marshaller's callback:
/// borrowed, since the callback only needs it for the duration of one
/// `emit` call.
pub struct RawDirEntry<'a> {
    pub ino: u64,
    pub etype: EntryType,
    pub name: &'a str,
}

/// Marshals the directory open on `handle` into `user_buf` (§4.G).
/// `handle.pos` records how many entries previous calls already returned,
/// so repeated calls resume rather than re-emit. Returns the number of
/// bytes written.
pub fn getdents(
    handle: &Handle,
    user_buf: UserSlice<'_>,
    user_mem: &dyn UserMemory,
) -> SysResult<usize> {
    let buf_size = user_buf.len();
    let start_pos = handle.pos.load(Ordering::Relaxed);

    let mut offset: usize = 0;
    let mut index: usize = 0;
    let mut advanced: usize = 0;
    let mut outcome: SysResult<()> = Ok(());

    let result = handle.fs.ops().getdents(handle, &mut |raw: RawDirEntry<'_>| {
        if index < start_pos {
            index += 1;
            return Ok(true);
        }

        let name_len = raw.name.len();
        let entry_size = HEADER_LEN + name_len + 1;

        if offset + entry_size > buf_size {
            if offset == 0 {
                outcome = Err(SysError::EINVAL);
            }
            return Ok(false);
        }

        let header = DirentHeader {
            d_ino: raw.ino,
            d_off: (offset + entry_size) as u64,
            d_reclen: entry_size as u16,
            d_type: raw.etype.dirent_type(),
        };

        // SAFETY: `offset + entry_size <= buf_size` was just checked, and
        // `user_buf` is valid for `buf_size` bytes per its constructor's
        // contract.
        let entry_slice = unsafe { UserSlice::new(user_buf.as_mut_ptr().add(offset), entry_size) };

        let header_bytes =
            unsafe { core::slice::from_raw_parts(&header as *const _ as *const u8, HEADER_LEN) };
        if let Err(e) = user_mem.copy_out(entry_slice, header_bytes) {
            outcome = Err(e);
            return Ok(false);
        }

        let name_slice = unsafe {
            UserSlice::new(user_buf.as_mut_ptr().add(offset + HEADER_LEN), name_len + 1)
        };
        let mut name_with_nul = alloc::vec::Vec::with_capacity(name_len + 1);
        name_with_nul.extend_from_slice(raw.name.as_bytes());
        name_with_nul.push(0);
        if let Err(e) = user_mem.copy_out(name_slice, &name_with_nul) {
            outcome = Err(e);
            return Ok(false);
        }

        offset += entry_size;
        index += 1;
        advanced += 1;
        Ok(true)
    });

    handle.pos.fetch_add(advanced, Ordering::Relaxed);

    result?;
    outcome?;
    Ok(offset)
}
