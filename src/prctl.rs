//! The `prctl()` operations that capability handling depends on.

use crate::Errno;

type Result<T> = core::result::Result<T, Errno>;

#[inline]
pub fn get_no_new_privs() -> Result<bool> {
    let res = unsafe { crate::raw_prctl(libc::PR_GET_NO_NEW_PRIVS, 0, 0, 0, 0) }?;

    Ok(res != 0)
}

/// Set the "no new privileges" flag. It can never be cleared again.
#[inline]
pub fn set_no_new_privs() -> Result<()> {
    unsafe { crate::raw_prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) }?;

    Ok(())
}

#[inline]
pub fn get_keepcaps() -> Result<bool> {
    let res = unsafe { crate::raw_prctl(libc::PR_GET_KEEPCAPS, 0, 0, 0, 0) }?;

    Ok(res != 0)
}

#[inline]
pub fn set_keepcaps(keep: bool) -> Result<()> {
    unsafe { crate::raw_prctl(libc::PR_SET_KEEPCAPS, keep as libc::c_ulong, 0, 0, 0) }?;

    Ok(())
}

bitflags::bitflags! {
    /// The thread's "securebits" flags (see `capabilities(7)`).
    pub struct Secbits: libc::c_ulong {
        const NOROOT = 0x1;
        const NOROOT_LOCKED = 0x2;

        const NO_SETUID_FIXUP = 0x4;
        const NO_SETUID_FIXUP_LOCKED = 0x8;

        const KEEP_CAPS = 0x10;
        const KEEP_CAPS_LOCKED = 0x20;

        const NO_CAP_AMBIENT_RAISE = 0x40;
        const NO_CAP_AMBIENT_RAISE_LOCKED = 0x80;
    }
}

impl Secbits {
    /// The bits that stop root (UID 0) and set-UID transitions from granting capabilities, in
    /// their locked form.
    pub const LOCKDOWN: Self = Self::from_bits_truncate(
        Self::NOROOT.bits()
            | Self::NOROOT_LOCKED.bits()
            | Self::NO_SETUID_FIXUP.bits()
            | Self::NO_SETUID_FIXUP_LOCKED.bits(),
    );
}

pub fn get_securebits() -> Result<Secbits> {
    let f = unsafe { crate::raw_prctl(libc::PR_GET_SECUREBITS, 0, 0, 0, 0) }?;

    Ok(Secbits::from_bits_truncate(f as libc::c_ulong))
}

pub fn set_securebits(flags: Secbits) -> Result<()> {
    unsafe { crate::raw_prctl(libc::PR_SET_SECUREBITS, flags.bits(), 0, 0, 0) }?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepcaps() {
        let old_keepcaps = get_keepcaps().unwrap();

        set_keepcaps(true).unwrap();
        assert!(get_keepcaps().unwrap());
        assert!(get_securebits().unwrap().contains(Secbits::KEEP_CAPS));

        set_keepcaps(false).unwrap();
        assert!(!get_keepcaps().unwrap());
        assert!(!get_securebits().unwrap().contains(Secbits::KEEP_CAPS));

        set_keepcaps(old_keepcaps).unwrap();
    }

    #[test]
    fn test_nnp() {
        set_no_new_privs().unwrap();
        assert!(get_no_new_privs().unwrap());
        set_no_new_privs().unwrap();
        assert!(get_no_new_privs().unwrap());
    }

    #[test]
    fn test_lockdown_bits() {
        assert_eq!(Secbits::LOCKDOWN.bits(), 0xf);
        assert!(!Secbits::LOCKDOWN.contains(Secbits::KEEP_CAPS));
    }
}
