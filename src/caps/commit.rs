use std::os::unix::prelude::*;

use super::{ambient, bounding, BufferState, Cap, CapNg, CapState, FileCaps, Select};
use crate::prctl::{self, Secbits};
use crate::{Errno, Error, Result};

impl CapNg {
    /// Push the sets covered by `select` to the target process.
    ///
    /// The bounding set is handled first (capabilities can only be dropped from it, which needs
    /// `CAP_SETPCAP`), then the effective/permitted/inheritable sets, then the ambient set. The
    /// bounding and ambient sets of a process other than the calling thread cannot be changed.
    ///
    /// Sets the kernel would refuse (an effective capability that is not permitted, a permitted
    /// capability the thread no longer has, an ambient capability that is not both permitted and
    /// inheritable, a bounding drop without `CAP_SETPCAP`) fail with `EPERM` before anything is
    /// changed.
    pub fn apply(&mut self, select: Select) -> Result<()> {
        if !self.state.is_initialized() {
            return Err(Error::Uninitialized);
        }

        let foreign = !self.target.is_self();
        if foreign && (select.covers_bounds() || select.covers_ambient()) {
            return eperm();
        }

        self.check_apply(select)?;

        log::debug!("applying {} to {:?}", select, self.target);

        if select.covers_bounds() {
            let dropped = self.supported - self.sets.bounding;
            bounding::drop_all(dropped)?;

            let unraisable = self.sets.bounding - bounding::probe();
            if !unraisable.is_empty() {
                log::trace!("bounding set cannot regain {:?}", unraisable);
            }
        }

        if select.covers_caps() {
            let pid = if foreign { self.target.pid() } else { 0 };
            self.sets.capstate().set_for_pid(pid)?;
        }

        if select.covers_ambient() && ambient::is_supported() {
            ambient::set_exact(self.sets.ambient & self.supported)?;
        }

        self.state = BufferState::Applied;
        Ok(())
    }

    /// Reject a buffer that the kernel would refuse part-way through `apply()`, before anything is
    /// changed.
    fn check_apply(&self, select: Select) -> Result<()> {
        let sets = &self.sets;

        if select.covers_caps() && !sets.permitted.is_superset(sets.effective) {
            log::debug!("effective set {:?} is not permitted", sets.effective - sets.permitted);
            return eperm();
        }

        if !self.target.is_self() {
            return Ok(());
        }

        let current = CapState::get_current()?;
        let can_setpcap = current.effective.has(Cap::SETPCAP);
        let mut bset = bounding::probe();

        if select.covers_bounds() {
            let dropped = bset - sets.bounding;
            if !dropped.is_empty() && !can_setpcap {
                log::debug!("dropping {:?} from the bounding set needs CAP_SETPCAP", dropped);
                return eperm();
            }
            bset &= sets.bounding;
        }

        let (permitted, inheritable) = if select.covers_caps() {
            if !current.permitted.is_superset(sets.permitted) {
                log::debug!("cannot regain {:?}", sets.permitted - current.permitted);
                return eperm();
            }

            let gained = sets.inheritable - current.inheritable;
            if !(bset.is_superset(gained) && (can_setpcap || current.permitted.is_superset(gained)))
            {
                log::debug!("cannot add {:?} to the inheritable set", gained);
                return eperm();
            }

            (sets.permitted, sets.inheritable)
        } else {
            (current.permitted, current.inheritable)
        };

        if select.covers_ambient() && ambient::is_supported() {
            let ambient = sets.ambient & self.supported;
            if !(permitted & inheritable).is_superset(ambient) {
                log::debug!("ambient set {:?} is not permitted and inheritable", ambient);
                return eperm();
            }
        }

        Ok(())
    }

    /// Write the buffer's permitted and inheritable sets to the regular file open as `fd`.
    ///
    /// The file's effective flag is set if the effective set is not empty. If all three sets are
    /// empty the file's capabilities are removed instead. A root UID set with
    /// [`set_rootid()`](#method.set_rootid) is written as well.
    pub fn apply_caps_file(&self, fd: RawFd) -> Result<()> {
        if !self.state.is_initialized() {
            return Err(Error::Uninitialized);
        }

        let filecaps = FileCaps {
            effective: !self.sets.effective.is_empty(),
            permitted: self.sets.permitted,
            inheritable: self.sets.inheritable,
            rootid: self.rootid,
        };

        log::debug!("writing capabilities to fd {}: {:?}", fd, filecaps);
        filecaps.set_for_fd(fd)?;

        Ok(())
    }

    /// Stop the calling thread from ever gaining capabilities again through UID 0, set-UID
    /// transitions, or `execve()` of privileged files.
    ///
    /// This locks the securebits that disable root's special treatment and sets the
    /// "no new privileges" flag. Neither can be undone. Calling it again once locked does
    /// nothing.
    pub fn lock(&self) -> Result<()> {
        let secbits = prctl::get_securebits()?;

        if !secbits.contains(Secbits::LOCKDOWN) {
            log::debug!("locking securebits {:?}", secbits | Secbits::LOCKDOWN);
            prctl::set_securebits(secbits | Secbits::LOCKDOWN)?;
        }

        if !prctl::get_no_new_privs()? {
            log::debug!("setting no_new_privs");
            prctl::set_no_new_privs()?;
        }

        Ok(())
    }
}

#[inline]
fn eperm() -> Result<()> {
    Err(Errno::from_code(libc::EPERM).into())
}
