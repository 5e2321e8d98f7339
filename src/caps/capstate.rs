use super::CapSet;
use crate::sys::{self, cap_user_data_t};
use crate::Errno;

/// The permitted, effective, and inheritable capability sets of a thread, i.e. the part of the
/// capability state that `capget()`/`capset()` transfer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CapState {
    pub effective: CapSet,
    pub permitted: CapSet,
    pub inheritable: CapSet,
}

impl CapState {
    /// Construct an empty `CapState` object.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the capability state of the current thread.
    #[inline]
    pub fn get_current() -> Result<Self, Errno> {
        Self::get_for_pid(0)
    }

    /// Get the capability state of the process (or thread) with the given PID (or TID).
    ///
    /// If `pid` is 0, this method gets the capability state of the current thread.
    pub fn get_for_pid(pid: libc::pid_t) -> Result<Self, Errno> {
        let raw = sys::get_caps(pid)?;

        Ok(Self {
            effective: CapSet::from_bitmasks_u32(raw[0].effective, raw[1].effective),
            permitted: CapSet::from_bitmasks_u32(raw[0].permitted, raw[1].permitted),
            inheritable: CapSet::from_bitmasks_u32(raw[0].inheritable, raw[1].inheritable),
        })
    }

    /// Set the current thread's capability state to the state represented by this object.
    #[inline]
    pub fn set_current(&self) -> Result<(), Errno> {
        self.set_for_pid(0)
    }

    /// Set the capability state of `pid`.
    ///
    /// Modern kernels refuse (with `EPERM`) to change any thread other than the caller.
    pub fn set_for_pid(&self, pid: libc::pid_t) -> Result<(), Errno> {
        let (eff_lo, eff_hi) = self.effective.to_bitmasks_u32();
        let (prm_lo, prm_hi) = self.permitted.to_bitmasks_u32();
        let (inh_lo, inh_hi) = self.inheritable.to_bitmasks_u32();

        let raw = [
            cap_user_data_t {
                effective: eff_lo,
                permitted: prm_lo,
                inheritable: inh_lo,
            },
            cap_user_data_t {
                effective: eff_hi,
                permitted: prm_hi,
                inheritable: inh_hi,
            },
        ];

        sys::set_caps(pid, &raw)
    }
}
