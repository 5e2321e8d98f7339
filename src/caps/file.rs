use std::os::unix::prelude::*;

use super::CapSet;
use crate::sys;
use crate::Errno;

/// Represents the capabilities attached to a file (its `security.capability` extended
/// attribute).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FileCaps {
    /// Whether the permitted capabilities become effective on `execve()`.
    pub effective: bool,
    pub permitted: CapSet,
    pub inheritable: CapSet,
    /// The root UID of the user namespace the capabilities apply to (revision 3 only).
    pub rootid: Option<libc::uid_t>,
}

#[inline]
fn read_u32(attrs: &[u8], offset: usize) -> u32 {
    let mut word = [0; 4];
    word.copy_from_slice(&attrs[offset..offset + 4]);
    u32::from_le_bytes(word)
}

impl FileCaps {
    /// Construct an empty `FileCaps` object.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether there is nothing to attach; such a value is stored by removing the attribute.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.effective && self.permitted.is_empty() && self.inheritable.is_empty()
    }

    /// Get the file capabilities attached to the open file identified by the file descriptor `fd`.
    ///
    /// Returns `Ok(None)` if the file has no capabilities attached.
    pub fn get_for_fd(fd: RawFd) -> Result<Option<Self>, Errno> {
        let mut data = [0; sys::XATTR_CAPS_MAX_SIZE];

        match sys::get_caps_xattr(fd, &mut data)? {
            Some(len) => Ok(Some(Self::unpack_attrs(&data[..len])?)),
            None => Ok(None),
        }
    }

    /// Attach these capabilities to the regular file open as `fd`, or remove its capabilities if
    /// this value [`is_empty()`](#method.is_empty).
    ///
    /// This usually requires `CAP_SETFCAP` and ownership of the file.
    pub fn set_for_fd(&self, fd: RawFd) -> Result<(), Errno> {
        sys::check_regular_file(fd)?;

        if self.is_empty() {
            // Removal needs CAP_SETFCAP even when there is nothing to remove
            let mut data = [0; sys::XATTR_CAPS_MAX_SIZE];
            match sys::get_caps_xattr(fd, &mut data)? {
                Some(_) => sys::remove_caps_xattr(fd),
                None => Ok(()),
            }
        } else {
            sys::set_caps_xattr(fd, &self.pack_attrs())
        }
    }

    /// From the raw data from the `security.capability` extended attribute of a file, construct a
    /// new `FileCaps` object representing the same data.
    ///
    /// Revisions 1, 2 and 3 of the format are understood; anything else is `EINVAL`.
    pub fn unpack_attrs(attrs: &[u8]) -> Result<Self, Errno> {
        let len = attrs.len();

        if len < 4 {
            return Err(Errno::from_code(libc::EINVAL));
        }

        let magic = read_u32(attrs, 0);
        let version = magic & sys::VFS_CAP_REVISION_MASK;
        let flags = magic & sys::VFS_CAP_FLAGS_MASK;

        let effective = (flags & sys::VFS_CAP_FLAGS_EFFECTIVE) != 0;

        match (version, len) {
            (sys::VFS_CAP_REVISION_1, sys::XATTR_CAPS_SZ_1) => Ok(Self {
                effective,
                permitted: CapSet::from_bitmasks_u32(read_u32(attrs, 4), 0),
                inheritable: CapSet::from_bitmasks_u32(read_u32(attrs, 8), 0),
                rootid: None,
            }),

            (sys::VFS_CAP_REVISION_2, sys::XATTR_CAPS_SZ_2)
            | (sys::VFS_CAP_REVISION_3, sys::XATTR_CAPS_SZ_3) => Ok(Self {
                effective,
                permitted: CapSet::from_bitmasks_u32(read_u32(attrs, 4), read_u32(attrs, 12)),
                inheritable: CapSet::from_bitmasks_u32(read_u32(attrs, 8), read_u32(attrs, 16)),
                rootid: if version == sys::VFS_CAP_REVISION_3 {
                    Some(read_u32(attrs, 20))
                } else {
                    None
                },
            }),

            _ => Err(Errno::from_code(libc::EINVAL)),
        }
    }

    /// Encode this object as a `security.capability` attribute: revision 3 if a root UID is set,
    /// revision 2 otherwise.
    pub fn pack_attrs(&self) -> Vec<u8> {
        let (version, size) = if self.rootid.is_some() {
            (sys::VFS_CAP_REVISION_3, sys::XATTR_CAPS_SZ_3)
        } else {
            (sys::VFS_CAP_REVISION_2, sys::XATTR_CAPS_SZ_2)
        };

        let mut magic = version;
        if self.effective {
            magic |= sys::VFS_CAP_FLAGS_EFFECTIVE;
        }

        let (prm_lo, prm_hi) = self.permitted.to_bitmasks_u32();
        let (inh_lo, inh_hi) = self.inheritable.to_bitmasks_u32();

        let mut attrs = Vec::with_capacity(size);
        for word in [magic, prm_lo, inh_lo, prm_hi, inh_hi].iter() {
            attrs.extend_from_slice(&word.to_le_bytes());
        }
        if let Some(rootid) = self.rootid {
            attrs.extend_from_slice(&rootid.to_le_bytes());
        }

        debug_assert_eq!(attrs.len(), size);
        attrs
    }
}

impl TryFrom<&[u8]> for FileCaps {
    type Error = Errno;

    #[inline]
    fn try_from(attrs: &[u8]) -> Result<Self, Errno> {
        Self::unpack_attrs(attrs)
    }
}
