use super::{BufferState, CapNg, CapSets, Target};

/// A copy of a [`CapNg`] buffer, taken by [`CapNg::save()`].
///
/// It can only be given back once: [`CapNg::restore()`] takes it by value.
#[derive(Debug)]
#[must_use = "a saved state does nothing unless it is restored"]
pub struct SavedState {
    target: Target,
    state: BufferState,
    sets: CapSets,
    rootid: Option<libc::uid_t>,
}

impl SavedState {
    /// The sets as they were when the snapshot was taken.
    #[inline]
    pub fn sets(&self) -> &CapSets {
        &self.sets
    }
}

impl CapNg {
    /// Snapshot the whole buffer (sets, target, state and root UID).
    pub fn save(&self) -> SavedState {
        log::trace!("saving buffer in state {:?}", self.state);

        SavedState {
            target: self.target,
            state: self.state,
            sets: self.sets,
            rootid: self.rootid,
        }
    }

    /// Put a snapshot back into the buffer, consuming it.
    ///
    /// Only the buffer changes; call [`apply()`](#method.apply) to push it to the kernel again.
    pub fn restore(&mut self, saved: SavedState) {
        log::trace!("restoring buffer to state {:?}", saved.state);

        self.target = saved.target;
        self.state = saved.state;
        self.sets = saved.sets;
        self.rootid = saved.rootid;
    }

    /// Run `f` on this buffer and then restore the buffer to what it was before, whatever `f`
    /// did to it.
    ///
    /// ```
    /// use capng::{Action, Cap, CapNg, CapType, Select};
    ///
    /// let mut caps = CapNg::new();
    /// caps.clear(Select::Caps);
    ///
    /// let raised = caps.scoped(|caps| {
    ///     caps.update(Action::Add, CapType::EFFECTIVE, Cap::KILL).unwrap();
    ///     caps.have_capability(CapType::EFFECTIVE, Cap::KILL)
    /// });
    ///
    /// assert!(raised);
    /// assert!(!caps.have_capability(CapType::EFFECTIVE, Cap::KILL));
    /// ```
    pub fn scoped<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let saved = self.save();
        let res = f(self);
        self.restore(saved);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{Action, Cap, CapType, Select};

    fn snapshot_matrix(caps: &CapNg) -> Vec<bool> {
        let mut res = Vec::new();
        for (t, _) in CapSets::default().iter_types(CapType::all()) {
            for cap in Cap::iter() {
                res.push(caps.have_capability(t, cap));
            }
        }
        res
    }

    #[test]
    fn test_save_restore_identity() {
        let mut caps = CapNg::current_process().unwrap();
        caps.update(Action::Add, CapType::BOUNDING_SET, Cap::CHOWN).unwrap();
        let before = snapshot_matrix(&caps);
        let state = caps.state();

        let saved = caps.save();
        assert_eq!(saved.sets(), caps.sets());
        caps.restore(saved);

        assert_eq!(snapshot_matrix(&caps), before);
        assert_eq!(caps.state(), state);
    }

    #[test]
    fn test_restore_reverts() {
        let mut caps = CapNg::new();
        caps.fill(Select::All);
        caps.set_rootid(Some(1000));
        let saved = caps.save();

        caps.clear(Select::All);
        caps.set_pid(1);
        caps.set_rootid(None);
        caps.restore(saved);

        assert_eq!(caps.sets().effective, caps.supported());
        assert_eq!(caps.sets().ambient, caps.supported());
        assert_eq!(caps.target(), Target::Current);
        assert_eq!(caps.rootid(), Some(1000));
        assert_eq!(caps.state(), BufferState::Initialized);
    }

    #[test]
    fn test_restore_uninitialized() {
        let mut caps = CapNg::new();
        let saved = caps.save();

        caps.clear(Select::Caps);
        caps.restore(saved);
        assert_eq!(caps.state(), BufferState::New);
    }

    #[test]
    fn test_scoped() {
        let mut caps = CapNg::new();
        caps.clear(Select::All);
        let before = *caps.sets();

        let res = caps.scoped(|caps| {
            caps.fill(Select::Both);
            caps.have_capabilities(Select::Both)
        });

        assert_eq!(res, crate::Coverage::Full);
        assert_eq!(*caps.sets(), before);
    }
}
