//! Kernel ABI constants and raw syscall wrappers.

#![allow(non_camel_case_types)]

use crate::Errno;

// WARNING: Updating to newer versions may require significant
// code changes to caps/capstate.rs
pub const _LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

// File capabilities constants
pub const VFS_CAP_FLAGS_EFFECTIVE: u32 = 0x00_0001;

pub const VFS_CAP_REVISION_MASK: u32 = 0xFF00_0000;
pub const VFS_CAP_FLAGS_MASK: u32 = !VFS_CAP_REVISION_MASK;

pub const VFS_CAP_REVISION_1: u32 = 0x0100_0000;
pub const XATTR_CAPS_SZ_1: usize = 12;
pub const VFS_CAP_REVISION_2: u32 = 0x0200_0000;
pub const XATTR_CAPS_SZ_2: usize = 20;
pub const VFS_CAP_REVISION_3: u32 = 0x0300_0000;
pub const XATTR_CAPS_SZ_3: usize = 24;

pub const XATTR_CAPS_MAX_SIZE: usize = XATTR_CAPS_SZ_3;

pub const XATTR_NAME_CAPS: &[u8] = b"security.capability\0";

extern "C" {
    fn capget(hdrp: *mut cap_user_header_t, datap: *mut cap_user_data_t) -> libc::c_int;

    fn capset(hdrp: *mut cap_user_header_t, datap: *const cap_user_data_t) -> libc::c_int;
}

#[repr(C)]
struct cap_user_header_t {
    version: u32,
    pid: libc::c_int,
}

/// One 32-bit half of the effective/permitted/inheritable sets, as `capget()` lays it out.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct cap_user_data_t {
    pub effective: u32,
    pub permitted: u32,
    pub inheritable: u32,
}

/// Read the capability sets of `pid` (0 means the calling thread).
pub fn get_caps(pid: libc::pid_t) -> Result<[cap_user_data_t; 2], Errno> {
    let mut header = cap_user_header_t {
        version: _LINUX_CAPABILITY_VERSION_3,
        pid: pid as libc::c_int,
    };
    let mut data = [cap_user_data_t::default(); 2];

    if unsafe { capget(&mut header, data.as_mut_ptr()) } < 0 {
        return Err(Errno::last());
    }

    Ok(data)
}

/// Write the capability sets of `pid`. The kernel only accepts 0 or the caller's own TID.
pub fn set_caps(pid: libc::pid_t, data: &[cap_user_data_t; 2]) -> Result<(), Errno> {
    let mut header = cap_user_header_t {
        version: _LINUX_CAPABILITY_VERSION_3,
        pid: pid as libc::c_int,
    };

    if unsafe { capset(&mut header, data.as_ptr()) } < 0 {
        return Err(Errno::last());
    }

    Ok(())
}

cfg_if::cfg_if! {
    if #[cfg(all(
        target_pointer_width = "32",
        any(target_arch = "arm", target_arch = "sparc", target_arch = "x86")
    ))] {
        const SYS_SETRESGID: libc::c_long = libc::SYS_setresgid32;
        const SYS_SETRESUID: libc::c_long = libc::SYS_setresuid32;
        const SYS_SETGROUPS: libc::c_long = libc::SYS_setgroups32;
    } else {
        const SYS_SETRESGID: libc::c_long = libc::SYS_setresgid;
        const SYS_SETRESUID: libc::c_long = libc::SYS_setresuid;
        const SYS_SETGROUPS: libc::c_long = libc::SYS_setgroups;
    }
}

// The raw syscalls only change the calling thread; glibc's wrappers would broadcast the change to
// every thread, which would leave the other threads without the kept capabilities.

pub fn setresgid(rgid: libc::gid_t, egid: libc::gid_t, sgid: libc::gid_t) -> Result<(), Errno> {
    if unsafe { libc::syscall(SYS_SETRESGID, rgid, egid, sgid) } < 0 {
        return Err(Errno::last());
    }
    Ok(())
}

pub fn setresuid(uid: libc::uid_t) -> Result<(), Errno> {
    if unsafe { libc::syscall(SYS_SETRESUID, uid, uid, uid) } < 0 {
        return Err(Errno::last());
    }
    Ok(())
}

pub fn setgroups(groups: &[libc::gid_t]) -> Result<(), Errno> {
    if unsafe { libc::syscall(SYS_SETGROUPS, groups.len(), groups.as_ptr()) } < 0 {
        return Err(Errno::last());
    }
    Ok(())
}

/// The calling thread's real, effective and saved GIDs.
pub fn getresgid() -> Result<(libc::gid_t, libc::gid_t, libc::gid_t), Errno> {
    let (mut rgid, mut egid, mut sgid) = (0, 0, 0);
    if unsafe { libc::getresgid(&mut rgid, &mut egid, &mut sgid) } < 0 {
        return Err(Errno::last());
    }
    Ok((rgid, egid, sgid))
}

/// The calling thread's supplementary groups.
pub fn getgroups() -> Result<Vec<libc::gid_t>, Errno> {
    loop {
        let n = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
        if n < 0 {
            return Err(Errno::last());
        }

        let mut groups = vec![0; n as usize];
        match unsafe { libc::getgroups(n, groups.as_mut_ptr()) } {
            // The list grew in between
            m if m < 0 && Errno::last().code() == libc::EINVAL => continue,
            m if m < 0 => return Err(Errno::last()),
            m => {
                groups.truncate(m as usize);
                return Ok(groups);
            }
        }
    }
}

/// Look up the login name and primary GID of `uid` in the user database.
pub fn account_for_uid(uid: libc::uid_t) -> Result<Option<(std::ffi::CString, libc::gid_t)>, Errno> {
    let mut buf = vec![0 as libc::c_char; 1024];

    loop {
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let ret = unsafe {
            libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };

        if ret == libc::ERANGE && buf.len() < (1 << 20) {
            buf.resize(buf.len() * 2, 0);
            continue;
        } else if ret != 0 {
            return Err(Errno::from_code(ret));
        } else if result.is_null() {
            return Ok(None);
        }

        let name = unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) }.to_owned();
        return Ok(Some((name, pwd.pw_gid)));
    }
}

/// Set the supplementary groups to those `name` belongs to, plus `gid`.
pub fn initgroups(name: &std::ffi::CStr, gid: libc::gid_t) -> Result<(), Errno> {
    if unsafe { libc::initgroups(name.as_ptr(), gid) } < 0 {
        return Err(Errno::last());
    }
    Ok(())
}

/// Fetch the raw `security.capability` attribute of `fd` into `buf`.
///
/// Returns `Ok(None)` if the file has no capabilities attached.
pub fn get_caps_xattr(fd: libc::c_int, buf: &mut [u8]) -> Result<Option<usize>, Errno> {
    let ret = unsafe {
        libc::fgetxattr(
            fd,
            XATTR_NAME_CAPS.as_ptr() as *const libc::c_char,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };

    if ret >= 0 {
        Ok(Some(ret as usize))
    } else {
        match Errno::last() {
            e if e.code() == libc::ENODATA => Ok(None),
            e => Err(e),
        }
    }
}

pub fn set_caps_xattr(fd: libc::c_int, data: &[u8]) -> Result<(), Errno> {
    let ret = unsafe {
        libc::fsetxattr(
            fd,
            XATTR_NAME_CAPS.as_ptr() as *const libc::c_char,
            data.as_ptr() as *const libc::c_void,
            data.len(),
            0,
        )
    };

    if ret < 0 {
        return Err(Errno::last());
    }
    Ok(())
}

/// Remove the `security.capability` attribute of `fd`. A missing attribute is not an error.
pub fn remove_caps_xattr(fd: libc::c_int) -> Result<(), Errno> {
    let ret =
        unsafe { libc::fremovexattr(fd, XATTR_NAME_CAPS.as_ptr() as *const libc::c_char) };

    if ret < 0 {
        match Errno::last() {
            e if e.code() == libc::ENODATA => (),
            e => return Err(e),
        }
    }
    Ok(())
}

/// Check that `fd` refers to a regular file.
pub fn check_regular_file(fd: libc::c_int) -> Result<(), Errno> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };

    if unsafe { libc::fstat(fd, &mut st) } < 0 {
        return Err(Errno::last());
    }

    if st.st_mode & libc::S_IFMT != libc::S_IFREG {
        return Err(Errno::from_code(libc::EINVAL));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::prelude::*;

    use super::*;

    #[test]
    fn test_get_caps_self() {
        let by_zero = get_caps(0).unwrap();
        let by_pid = get_caps(std::process::id() as libc::pid_t).unwrap();
        assert_eq!(by_zero, by_pid);
    }

    #[test]
    fn test_get_caps_bad_pid() {
        assert_eq!(get_caps(-1).unwrap_err().code(), libc::EINVAL);
        assert_eq!(get_caps(libc::pid_t::MAX).unwrap_err().code(), libc::ESRCH);
    }

    #[test]
    fn test_set_caps_unchanged() {
        let data = get_caps(0).unwrap();
        set_caps(0, &data).unwrap();
        assert_eq!(get_caps(0).unwrap(), data);
    }

    #[test]
    fn test_account_for_root() {
        let (name, gid) = account_for_uid(0).unwrap().unwrap();
        assert_eq!(name.to_str().unwrap(), "root");
        assert_eq!(gid, 0);
    }

    #[test]
    fn test_xattr_missing() {
        let f = tempfile::tempfile().unwrap();
        let mut buf = [0; XATTR_CAPS_MAX_SIZE];
        assert_eq!(get_caps_xattr(f.as_raw_fd(), &mut buf).unwrap(), None);
    }

    #[test]
    fn test_check_regular_file() {
        let f = tempfile::tempfile().unwrap();
        check_regular_file(f.as_raw_fd()).unwrap();

        let dir = std::fs::File::open("/").unwrap();
        assert_eq!(
            check_regular_file(dir.as_raw_fd()).unwrap_err().code(),
            libc::EINVAL
        );
    }
}
