//! The current thread's bounding set, read and dropped one capability at a time with `prctl()`.

use super::{Cap, CapSet};
use crate::Errno;

/// Drop the given capability from the current thread's bounding capability set.
///
/// This requires `CAP_SETPCAP` in the effective set.
#[inline]
pub fn drop(cap: Cap) -> Result<(), Errno> {
    unsafe { crate::raw_prctl(libc::PR_CAPBSET_DROP, cap as libc::c_ulong, 0, 0, 0) }?;

    Ok(())
}

/// Check if the given capability is raised in the current thread's bounding capability set.
///
/// This returns `Some(true)` if the given capability is raised, `Some(false)` if it is lowered, and
/// `None` if it is not supported.
#[inline]
pub fn read(cap: Cap) -> Option<bool> {
    read_raw(cap as _)
}

#[inline]
fn read_raw(cap: libc::c_ulong) -> Option<bool> {
    match unsafe { crate::raw_prctl(libc::PR_CAPBSET_READ, cap, 0, 0, 0) } {
        Ok(res) => Some(res != 0),
        Err(e) => {
            debug_assert_eq!(e.code(), libc::EINVAL);
            None
        }
    }
}

/// "Probes" the current thread's bounding capability set and returns a `CapSet` representing all
/// the capabilities that are currently raised.
pub fn probe() -> CapSet {
    let mut set = CapSet::empty();

    for cap in Cap::iter() {
        match read(cap) {
            Some(true) => set.add(cap),
            Some(false) => (),

            // Unsupported capability encountered; none of the remaining ones will be supported
            // either
            _ => break,
        }
    }

    set
}

/// Drop every capability in `caps` that is still raised in the bounding set.
///
/// Capabilities that are already lowered are skipped, so a thread without `CAP_SETPCAP` can
/// "drop" a set that the bounding set no longer contains.
pub fn drop_all(caps: CapSet) -> Result<(), Errno> {
    for cap in caps {
        if read(cap) == Some(true) {
            log::trace!("dropping {} from the bounding set", cap);
            drop(cap)?;
        }
    }

    Ok(())
}

/// Drop all capabilities supported by the kernel from the current thread's bounding capability
/// set, including ones newer than this library.
pub fn clear() -> Result<(), Errno> {
    for cap in 0..(super::CAP_MAX as libc::c_ulong * 2) {
        match unsafe { crate::raw_prctl(libc::PR_CAPBSET_DROP, cap, 0, 0, 0) } {
            Ok(_) => (),
            Err(e) if e.code() == libc::EINVAL && cap != 0 => return Ok(()),
            Err(e) if e.code() == libc::EPERM && read_raw(cap) == Some(false) => (),
            Err(e) => return Err(e),
        }
    }

    Err(Errno::from_code(libc::E2BIG))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapState;

    fn have_setpcap() -> bool {
        CapState::get_current()
            .unwrap()
            .effective
            .has(Cap::SETPCAP)
    }

    #[test]
    fn test_bounding() {
        probe();
        read(Cap::CHOWN).unwrap();
        assert!(Cap::probe_supported().is_superset(probe()));
    }

    #[test]
    fn test_bounding_drop() {
        if have_setpcap() {
            drop(Cap::SETPCAP).unwrap();
        } else {
            assert_eq!(drop(Cap::SETPCAP).unwrap_err().code(), libc::EPERM);
        }
    }

    #[test]
    fn test_drop_all_lowered() {
        // Lowered capabilities are skipped even without CAP_SETPCAP
        let lowered = Cap::probe_supported() - probe();
        drop_all(lowered).unwrap();
        drop_all(CapSet::empty()).unwrap();
    }

    #[test]
    fn test_clear() {
        if have_setpcap() {
            clear().unwrap();
            assert_eq!(probe(), CapSet::empty());
        }
    }
}
