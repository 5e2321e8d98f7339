use std::ffi::CStr;
use std::fmt;

use super::{bounding, BufferState, Cap, CapNg, CapState, Flags};
use crate::{prctl, sys, Errno, Error, Result};

/// The step of [`CapNg::change_id()`] that failed.
///
/// Each step has a fixed negative code (see [`code()`](#method.code)).
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ChangeIdStage {
    /// The buffer was never populated, cleared or filled.
    Uninitialized,
    /// Turning on "keep capabilities".
    KeepCaps,
    /// Raising `CAP_SETUID`/`CAP_SETGID`/`CAP_SETPCAP` for the transition.
    RaiseCaps,
    SetGid,
    /// Initializing or dropping the supplementary groups.
    SupplementaryGroups,
    SetUid,
    /// Turning off "keep capabilities".
    ResetKeepCaps,
    ClearBounding,
    /// Applying the buffered effective/permitted/inheritable sets.
    Apply,
    /// The new UID has no account to take supplementary groups from.
    NoAccount,
}

impl ChangeIdStage {
    pub fn code(self) -> i32 {
        match self {
            Self::Uninitialized => -1,
            Self::KeepCaps => -2,
            Self::RaiseCaps => -3,
            Self::SetGid => -4,
            Self::SupplementaryGroups => -5,
            Self::SetUid => -6,
            Self::ResetKeepCaps => -7,
            Self::ClearBounding => -8,
            Self::Apply => -9,
            Self::NoAccount => -10,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Uninitialized => "checking the capability buffer",
            Self::KeepCaps => "enabling keepcaps",
            Self::RaiseCaps => "raising setuid/setgid/setpcap",
            Self::SetGid => "setting the gid",
            Self::SupplementaryGroups => "setting supplementary groups",
            Self::SetUid => "setting the uid",
            Self::ResetKeepCaps => "disabling keepcaps",
            Self::ClearBounding => "clearing the bounding set",
            Self::Apply => "applying capabilities",
            Self::NoAccount => "looking up the account",
        }
    }
}

impl fmt::Display for ChangeIdStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (code {})", self.describe(), self.code())
    }
}

trait StageExt<T> {
    fn stage(self, stage: ChangeIdStage) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, Errno> {
    #[inline]
    fn stage(self, stage: ChangeIdStage) -> Result<T> {
        self.map_err(|source| {
            log::debug!("change_id failed while {}: {}", stage, source);
            Error::ChangeId { stage, source }
        })
    }
}

impl CapNg {
    /// Switch the calling thread to `uid`/`gid` while keeping the buffered capabilities.
    ///
    /// `None` leaves that ID unchanged. Afterwards the effective, permitted and inheritable sets
    /// are exactly the buffer's (the temporary `CAP_SETUID`/`CAP_SETGID`/`CAP_SETPCAP` are gone
    /// unless the buffer holds them), and with [`Flags::CLEAR_BOUNDING`] the bounding set is
    /// empty.
    ///
    /// Only the calling thread changes, except that [`Flags::INIT_SUPP_GRP`] goes through the C
    /// library's `initgroups()`, which sets the groups of every thread.
    ///
    /// Any error is an [`Error::ChangeId`] naming the failed step. The account for
    /// [`Flags::INIT_SUPP_GRP`] is looked up before anything changes, the GID and groups are put
    /// back if the UID cannot be set, and "keep capabilities" is reset to its previous value.
    /// A failure after the UID change leaves the new identity in place with the capabilities only
    /// partly applied.
    pub fn change_id(
        &mut self,
        uid: Option<libc::uid_t>,
        gid: Option<libc::gid_t>,
        flags: Flags,
    ) -> Result<()> {
        if !self.state.is_initialized() {
            return Err(Errno::from_code(libc::EINVAL)).stage(ChangeIdStage::Uninitialized);
        }

        log::debug!(
            "changing ids to uid {:?} gid {:?} with {:?}",
            uid,
            gid,
            flags
        );

        let account = match uid {
            Some(uid) if flags.contains(Flags::INIT_SUPP_GRP) => Some(
                sys::account_for_uid(uid)
                    .stage(ChangeIdStage::NoAccount)?
                    .ok_or_else(|| Errno::from_code(libc::ENOENT))
                    .stage(ChangeIdStage::NoAccount)?,
            ),
            _ => None,
        };
        let groups = match account {
            Some((ref name, pw_gid)) => Groups::Init(name.as_c_str(), gid.unwrap_or(pw_gid)),
            None if flags.contains(Flags::DROP_SUPP_GRP) => Groups::Drop,
            None => Groups::Keep,
        };

        let orig_keepcaps = prctl::get_keepcaps().stage(ChangeIdStage::KeepCaps)?;
        prctl::set_keepcaps(true).stage(ChangeIdStage::KeepCaps)?;

        let res = self.switch_ids(uid, gid, groups, flags);
        if res.is_err() {
            if let Err(e) = prctl::set_keepcaps(orig_keepcaps) {
                log::debug!("restoring keepcaps failed: {}", e);
            }
        }
        res
    }

    fn switch_ids(
        &mut self,
        uid: Option<libc::uid_t>,
        gid: Option<libc::gid_t>,
        groups: Groups,
        flags: Flags,
    ) -> Result<()> {
        let mut needed = CapState::get_current().stage(ChangeIdStage::RaiseCaps)?;
        let orig_effective = needed.effective;
        if gid.is_some() || !matches!(groups, Groups::Keep) {
            needed.effective.add(Cap::SETGID);
        }
        if uid.is_some() {
            needed.effective.add(Cap::SETUID);
        }
        if flags.contains(Flags::CLEAR_BOUNDING) {
            needed.effective.add(Cap::SETPCAP);
        }
        if needed.effective != orig_effective {
            needed.set_current().stage(ChangeIdStage::RaiseCaps)?;
        }

        if let Err(e) = set_ids(uid, gid, groups) {
            if needed.effective != orig_effective {
                needed.effective = orig_effective;
                if let Err(e) = needed.set_current() {
                    log::debug!("lowering the raised capabilities failed: {}", e);
                }
            }
            return Err(e);
        }

        prctl::set_keepcaps(false).stage(ChangeIdStage::ResetKeepCaps)?;

        if flags.contains(Flags::CLEAR_BOUNDING) {
            // Leaving UID 0 empties the effective set; CAP_SETPCAP survives in the permitted set
            let mut current = CapState::get_current().stage(ChangeIdStage::ClearBounding)?;
            if !current.effective.has(Cap::SETPCAP) {
                current.effective.add(Cap::SETPCAP);
                current.set_current().stage(ChangeIdStage::ClearBounding)?;
            }

            bounding::clear().stage(ChangeIdStage::ClearBounding)?;
            self.sets.bounding.clear();
        }

        self.sets
            .capstate()
            .set_current()
            .stage(ChangeIdStage::Apply)?;

        self.state = BufferState::Applied;
        Ok(())
    }
}

enum Groups<'a> {
    Keep,
    Drop,
    Init(&'a CStr, libc::gid_t),
}

/// Set the GID, supplementary groups and UID of the calling thread, in that order. If any step
/// fails the GIDs and groups are put back.
fn set_ids(uid: Option<libc::uid_t>, gid: Option<libc::gid_t>, groups: Groups) -> Result<()> {
    let (rgid, egid, sgid) = sys::getresgid().stage(ChangeIdStage::SetGid)?;
    let orig_groups = sys::getgroups().stage(ChangeIdStage::SupplementaryGroups)?;

    let changes_gids = gid.is_some() || !matches!(groups, Groups::Keep);

    let res = (|| -> Result<()> {
        if let Some(gid) = gid {
            sys::setresgid(gid, gid, gid).stage(ChangeIdStage::SetGid)?;
        }

        match groups {
            Groups::Init(name, gid) => {
                sys::initgroups(name, gid).stage(ChangeIdStage::SupplementaryGroups)?
            }
            Groups::Drop => sys::setgroups(&[]).stage(ChangeIdStage::SupplementaryGroups)?,
            Groups::Keep => (),
        }

        match uid {
            Some(uid) => sys::setresuid(uid).stage(ChangeIdStage::SetUid),
            None => Ok(()),
        }
    })();

    if res.is_err() && changes_gids {
        log::debug!("putting back gids {:?} and groups {:?}", (rgid, egid, sgid), orig_groups);

        if let Err(e) = sys::setgroups(&orig_groups).and(sys::setresgid(rgid, egid, sgid)) {
            log::debug!("restoring gids failed: {}", e);
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{Action, CapType, Select};

    fn in_thread<F: FnOnce() + Send + 'static>(f: F) {
        std::thread::spawn(f).join().unwrap();
    }

    fn thread_ids() -> (libc::uid_t, libc::gid_t) {
        let (mut ruid, mut euid, mut suid): (libc::uid_t, libc::uid_t, libc::uid_t) = (0, 0, 0);
        let (mut rgid, mut egid, mut sgid): (libc::gid_t, libc::gid_t, libc::gid_t) = (0, 0, 0);
        unsafe {
            libc::getresuid(&mut ruid, &mut euid, &mut suid);
            libc::getresgid(&mut rgid, &mut egid, &mut sgid);
        }
        (euid, egid)
    }

    #[test]
    fn test_stage_codes() {
        let stages = [
            ChangeIdStage::Uninitialized,
            ChangeIdStage::KeepCaps,
            ChangeIdStage::RaiseCaps,
            ChangeIdStage::SetGid,
            ChangeIdStage::SupplementaryGroups,
            ChangeIdStage::SetUid,
            ChangeIdStage::ResetKeepCaps,
            ChangeIdStage::ClearBounding,
            ChangeIdStage::Apply,
            ChangeIdStage::NoAccount,
        ];

        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.code(), -(i as i32) - 1);
        }
        assert_eq!(
            ChangeIdStage::SetUid.to_string(),
            "setting the uid (code -6)"
        );
    }

    #[test]
    fn test_change_id_uninitialized() {
        let mut caps = CapNg::new();
        match caps.change_id(None, None, Flags::NO_FLAG) {
            Err(Error::ChangeId { stage, source }) => {
                assert_eq!(stage, ChangeIdStage::Uninitialized);
                assert_eq!(stage.code(), -1);
                assert_eq!(source.code(), libc::EINVAL);
            }
            res => panic!("unexpected result {:?}", res),
        }
    }

    #[test]
    fn test_change_id_no_account() {
        in_thread(|| {
            let unused = (54321..)
                .find(|&uid| sys::account_for_uid(uid).unwrap().is_none())
                .unwrap();

            let ids = thread_ids();
            let gids = sys::getresgid().unwrap();
            let groups = sys::getgroups().unwrap();
            prctl::set_keepcaps(false).unwrap();

            let mut caps = CapNg::current_process().unwrap();
            match caps.change_id(Some(unused), Some(unused), Flags::INIT_SUPP_GRP) {
                Err(Error::ChangeId { stage, source }) => {
                    assert_eq!(stage, ChangeIdStage::NoAccount);
                    assert_eq!(stage.code(), -10);
                    assert_eq!(source.code(), libc::ENOENT);
                }
                res => panic!("unexpected result {:?}", res),
            }

            assert_eq!(thread_ids(), ids);
            assert_eq!(sys::getresgid().unwrap(), gids);
            assert_eq!(sys::getgroups().unwrap(), groups);
            assert!(!prctl::get_keepcaps().unwrap());
            assert_eq!(caps.state(), BufferState::Initialized);
        });
    }

    #[test]
    fn test_change_id_restores_keepcaps() {
        in_thread(|| {
            let state = CapState::get_current().unwrap();
            if state.permitted.has(Cap::SETUID) && state.permitted.has(Cap::SETGID) {
                return;
            }

            let mut caps = CapNg::current_process().unwrap();
            for &orig in [true, false].iter() {
                prctl::set_keepcaps(orig).unwrap();
                assert!(caps.change_id(Some(1000), Some(1000), Flags::NO_FLAG).is_err());
                assert_eq!(prctl::get_keepcaps().unwrap(), orig);
            }
            prctl::set_keepcaps(false).unwrap();
        });
    }

    #[test]
    fn test_change_id_nothing() {
        in_thread(|| {
            let ids = thread_ids();
            let mut caps = CapNg::current_process().unwrap();
            caps.update(Action::Drop, CapType::EFFECTIVE, Cap::SYS_ADMIN).unwrap();

            caps.change_id(None, None, Flags::NO_FLAG).unwrap();
            assert_eq!(caps.state(), BufferState::Applied);
            assert_eq!(thread_ids(), ids);
            assert_eq!(CapState::get_current().unwrap(), caps.sets().capstate());
            assert!(!prctl::get_keepcaps().unwrap());
        });
    }

    #[test]
    fn test_change_id_unprivileged() {
        in_thread(|| {
            let state = CapState::get_current().unwrap();
            if state.permitted.has(Cap::SETUID) && state.permitted.has(Cap::SETGID) {
                return;
            }

            let ids = thread_ids();
            let mut caps = CapNg::current_process().unwrap();
            match caps.change_id(Some(1000), Some(1000), Flags::CLEAR_BOUNDING) {
                Err(e @ Error::ChangeId { .. }) => {
                    assert!(matches!(
                        e,
                        Error::ChangeId {
                            stage: ChangeIdStage::RaiseCaps,
                            ..
                        }
                    ));
                    assert_eq!(e.raw_os_error(), Some(libc::EPERM));
                }
                res => panic!("unexpected result {:?}", res),
            }
            assert_eq!(thread_ids(), ids);
        });
    }

    #[test]
    fn test_change_id_privileged() {
        in_thread(|| {
            let state = CapState::get_current().unwrap();
            if !(state.permitted.has(Cap::SETUID)
                && state.permitted.has(Cap::SETGID)
                && state.permitted.has(Cap::SETPCAP))
            {
                return;
            }

            let mut caps = CapNg::current_process().unwrap();
            caps.clear(Select::Caps);
            caps.update(Action::Add, CapType::PERMITTED, Cap::NET_BIND_SERVICE)
                .unwrap();

            caps.change_id(Some(1000), Some(1000), Flags::CLEAR_BOUNDING | Flags::DROP_SUPP_GRP)
                .unwrap();

            assert_eq!(thread_ids(), (1000, 1000));
            assert_eq!(bounding::probe(), crate::CapSet::empty());
            assert!(caps.sets().bounding.is_empty());

            let now = CapState::get_current().unwrap();
            assert_eq!(now, caps.sets().capstate());
            assert!(now.permitted.has(Cap::NET_BIND_SERVICE));
            assert!(!now.effective.has(Cap::SETPCAP));
        });
    }
}
