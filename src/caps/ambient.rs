//! The current thread's ambient set (Linux 4.3+).

use super::{Cap, CapSet};
use crate::Errno;

#[inline]
fn ambient_prctl(op: libc::c_int, cap: libc::c_ulong) -> Result<libc::c_int, Errno> {
    unsafe { crate::raw_prctl(libc::PR_CAP_AMBIENT, op as libc::c_ulong, cap, 0, 0) }
}

/// Raise `cap` in the ambient set. It must already be in the permitted and inheritable sets.
#[inline]
pub fn raise(cap: Cap) -> Result<(), Errno> {
    ambient_prctl(libc::PR_CAP_AMBIENT_RAISE, cap as libc::c_ulong)?;

    Ok(())
}

/// Returns `None` if the kernel does not support ambient capabilities or does not know `cap`.
#[inline]
pub fn is_set(cap: Cap) -> Option<bool> {
    ambient_prctl(libc::PR_CAP_AMBIENT_IS_SET, cap as libc::c_ulong)
        .ok()
        .map(|x| x != 0)
}

#[inline]
pub fn clear() -> Result<(), Errno> {
    ambient_prctl(libc::PR_CAP_AMBIENT_CLEAR_ALL, 0)?;

    Ok(())
}

#[inline]
pub fn is_supported() -> bool {
    is_set(Cap::CHOWN).is_some()
}

/// Read the whole ambient set, or `None` if ambient capabilities are not supported at all.
pub fn probe() -> Option<CapSet> {
    let mut set = CapSet::empty();

    for cap in Cap::iter() {
        match is_set(cap) {
            Some(true) => set.add(cap),
            Some(false) => (),

            // Unsupported capability encountered; none of the remaining ones will be supported
            // either
            None => {
                if cap as u8 == 0 {
                    // Ambient capabilities aren't supported at all
                    return None;
                } else {
                    break;
                }
            }
        }
    }

    Some(set)
}

/// Replace the ambient set with `caps`: clear it, then raise each member.
pub fn set_exact(caps: CapSet) -> Result<(), Errno> {
    clear()?;

    for cap in caps {
        log::trace!("raising {} in the ambient set", cap);
        raise(cap)?;
    }

    Ok(())
}
