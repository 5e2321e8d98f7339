use std::os::unix::prelude::*;

use super::{
    ambient, bounding, procstatus, Action, Cap, CapRef, CapSet, CapState, CapType, Coverage,
    FileCaps, Select,
};
use crate::{Error, Result};

/// The process a [`CapNg`] buffer is read from and applied to.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Target {
    /// The calling thread.
    Current,
    /// Another process (or thread), by PID (or TID).
    Pid(libc::pid_t),
}

impl Target {
    #[inline]
    pub(crate) fn pid(self) -> libc::pid_t {
        match self {
            Self::Current => 0,
            Self::Pid(pid) => pid,
        }
    }

    /// Whether this target is the calling thread, the only one whose bounding and ambient sets
    /// can be changed.
    pub(crate) fn is_self(self) -> bool {
        match self {
            Self::Current => true,
            Self::Pid(pid) => pid == unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t,
        }
    }
}

impl Default for Target {
    #[inline]
    fn default() -> Self {
        Self::Current
    }
}

/// Where a buffer is in its life.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BufferState {
    /// Never populated, cleared or filled.
    New,
    /// The last attempt to read the target failed; the sets are unreliable.
    Error,
    Initialized,
    /// Changed since it was populated, cleared or filled.
    Updated,
    /// Pushed to the kernel.
    Applied,
}

impl BufferState {
    /// Whether the sets hold a defined value that may be applied.
    #[inline]
    pub fn is_initialized(self) -> bool {
        self >= Self::Initialized
    }
}

/// The contents of all five capability sets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CapSets {
    pub effective: CapSet,
    pub permitted: CapSet,
    pub inheritable: CapSet,
    pub bounding: CapSet,
    pub ambient: CapSet,
}

impl CapSets {
    /// Returns the sets named by `types`, in bit order, along with their single-bit type.
    pub fn iter_types(&self, types: CapType) -> impl Iterator<Item = (CapType, CapSet)> {
        let all = [
            (CapType::EFFECTIVE, self.effective),
            (CapType::PERMITTED, self.permitted),
            (CapType::INHERITABLE, self.inheritable),
            (CapType::BOUNDING_SET, self.bounding),
            (CapType::AMBIENT, self.ambient),
        ];

        all.into_iter().filter(move |(t, _)| types.contains(*t))
    }

    fn for_each_mut<F: FnMut(&mut CapSet)>(&mut self, types: CapType, mut f: F) {
        if types.contains(CapType::EFFECTIVE) {
            f(&mut self.effective);
        }
        if types.contains(CapType::PERMITTED) {
            f(&mut self.permitted);
        }
        if types.contains(CapType::INHERITABLE) {
            f(&mut self.inheritable);
        }
        if types.contains(CapType::BOUNDING_SET) {
            f(&mut self.bounding);
        }
        if types.contains(CapType::AMBIENT) {
            f(&mut self.ambient);
        }
    }

    /// The intersection of the sets named by `types` (empty if `types` is empty).
    pub fn common(&self, types: CapType) -> CapSet {
        if types.is_empty() {
            return CapSet::empty();
        }

        self.iter_types(types)
            .fold(CapSet::full(), |acc, (_, set)| acc & set)
    }

    #[inline]
    pub(crate) fn capstate(&self) -> CapState {
        CapState {
            effective: self.effective,
            permitted: self.permitted,
            inheritable: self.inheritable,
        }
    }
}

/// An uncommitted copy of a target's capability sets.
///
/// Every mutation works on this value alone; the kernel sees nothing until
/// [`apply()`](#method.apply), [`apply_caps_file()`](#method.apply_caps_file) or
/// [`change_id()`](#method.change_id) is called. Each `CapNg` owns its buffer, so two of them
/// never interfere; sharing one between threads requires external locking.
#[derive(Clone, Debug)]
pub struct CapNg {
    pub(super) target: Target,
    pub(super) state: BufferState,
    pub(super) sets: CapSets,
    pub(super) rootid: Option<libc::uid_t>,
    pub(super) supported: CapSet,
}

impl CapNg {
    /// Create an empty buffer targeting the calling thread. Nothing is read from the kernel.
    pub fn new() -> Self {
        Self {
            target: Target::Current,
            state: BufferState::New,
            sets: CapSets::default(),
            rootid: None,
            supported: Cap::probe_supported(),
        }
    }

    /// Create a buffer holding the calling thread's capabilities.
    pub fn current_process() -> Result<Self> {
        let mut caps = Self::new();
        caps.get_caps_process()?;
        Ok(caps)
    }

    /// Create a buffer holding the capabilities of process `pid`.
    pub fn other_process(pid: libc::pid_t) -> Result<Self> {
        let mut caps = Self::new();
        caps.set_pid(pid);
        caps.get_caps_process()?;
        Ok(caps)
    }

    /// Change the process that later calls read from and apply to. A `pid` of 0 is the calling
    /// thread. The buffer contents are kept.
    pub fn set_pid(&mut self, pid: libc::pid_t) {
        self.target = if pid == 0 {
            Target::Current
        } else {
            Target::Pid(pid)
        };
    }

    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    #[inline]
    pub fn state(&self) -> BufferState {
        self.state
    }

    #[inline]
    pub fn sets(&self) -> &CapSets {
        &self.sets
    }

    /// The capabilities the running kernel knows about.
    #[inline]
    pub fn supported(&self) -> CapSet {
        self.supported
    }

    #[inline]
    pub fn rootid(&self) -> Option<libc::uid_t> {
        self.rootid
    }

    /// Set the namespace root UID written with file capabilities. `None` writes a namespace-less
    /// attribute.
    #[inline]
    pub fn set_rootid(&mut self, rootid: Option<libc::uid_t>) {
        self.rootid = rootid;
    }

    /// Replace the buffer with the current capability sets of the target process.
    ///
    /// On failure the buffer is left in the [`BufferState::Error`] state.
    pub fn get_caps_process(&mut self) -> Result<()> {
        match self.read_process() {
            Ok(sets) => {
                log::debug!("read capabilities of {:?}: {:?}", self.target, sets);
                self.sets = sets;
                self.state = BufferState::Initialized;
                Ok(())
            }
            Err(e) => {
                log::debug!("reading capabilities of {:?} failed: {}", self.target, e);
                self.state = BufferState::Error;
                Err(e.into())
            }
        }
    }

    fn read_process(&self) -> std::result::Result<CapSets, crate::Errno> {
        let state = CapState::get_for_pid(self.target.pid())?;

        let (bounding, ambient) = match self.target {
            Target::Current => (bounding::probe(), ambient::probe().unwrap_or_default()),
            Target::Pid(pid) => {
                let status = procstatus::read_for_pid(pid)?;
                (status.bounding, status.ambient)
            }
        };

        Ok(CapSets {
            effective: state.effective,
            permitted: state.permitted,
            inheritable: state.inheritable,
            bounding,
            ambient,
        })
    }

    /// Replace the effective, permitted and inheritable sets with the capabilities attached to
    /// the file open as `fd`.
    ///
    /// Returns `Ok(false)` (with those sets emptied) if the file has no capabilities. A file
    /// whose capabilities are marked effective loads `permitted | inheritable` as the effective
    /// set.
    pub fn get_caps_file(&mut self, fd: RawFd) -> Result<bool> {
        let filecaps = match FileCaps::get_for_fd(fd) {
            Ok(filecaps) => filecaps,
            Err(e) => {
                log::debug!("reading capabilities of fd {} failed: {}", fd, e);
                self.state = BufferState::Error;
                return Err(e.into());
            }
        };

        let found = filecaps.is_some();
        let filecaps = filecaps.unwrap_or_default();
        log::debug!("read capabilities of fd {}: {:?}", fd, filecaps);

        self.sets.permitted = filecaps.permitted;
        self.sets.inheritable = filecaps.inheritable;
        self.sets.effective = if filecaps.effective {
            filecaps.permitted | filecaps.inheritable
        } else {
            CapSet::empty()
        };
        self.rootid = filecaps.rootid;
        self.state = BufferState::Initialized;

        Ok(found)
    }

    /// Empty every set covered by `select`.
    pub fn clear(&mut self, select: Select) {
        log::trace!("clearing {}", select);
        self.sets.for_each_mut(select.types(), CapSet::clear);
        self.state = BufferState::Initialized;
    }

    /// Raise every supported capability in the sets covered by `select`.
    pub fn fill(&mut self, select: Select) {
        log::trace!("filling {}", select);
        let supported = self.supported;
        self.sets.for_each_mut(select.types(), |set| *set = supported);
        self.state = BufferState::Initialized;
    }

    /// Add or drop one capability in every set named by `types`.
    ///
    /// The capability must be known to the running kernel. On error the buffer is unchanged.
    pub fn update<'a, R: Into<CapRef<'a>>>(
        &mut self,
        action: Action,
        types: CapType,
        cap: R,
    ) -> Result<Cap> {
        if !self.state.is_initialized() {
            return Err(Error::Uninitialized);
        }
        if types.is_empty() {
            return Err(Error::invalid("no capability set selected"));
        }

        let cap = cap.into().resolve()?;
        if !self.supported.has(cap) {
            return Err(Error::UnsupportedCapability(cap.code()));
        }

        log::trace!("{:?} {} in {:?}", action, cap, types);
        let add = action == Action::Add;
        self.sets.for_each_mut(types, |set| set.set_state(cap, add));
        self.state = BufferState::Updated;

        Ok(cap)
    }

    /// [`update()`](#method.update) each capability in order, stopping at the first failure.
    ///
    /// The result has one entry per capability attempted; only the last one can be an error.
    pub fn update_all<'a, I, R>(&mut self, action: Action, types: CapType, caps: I) -> Vec<Result<Cap>>
    where
        I: IntoIterator<Item = R>,
        R: Into<CapRef<'a>>,
    {
        let mut results = Vec::new();

        for cap in caps {
            let res = self.update(action, types, cap);
            let failed = res.is_err();
            results.push(res);
            if failed {
                break;
            }
        }

        results
    }

    /// Whether `cap` is raised in every set named by `types`.
    ///
    /// An empty `types`, or a capability that is not in the registry, gives `false`.
    pub fn have_capability<'a, R: Into<CapRef<'a>>>(&self, types: CapType, cap: R) -> bool {
        match cap.into().resolve() {
            Ok(cap) => self.sets.common(types).has(cap),
            Err(_) => false,
        }
    }

    /// How many of the supported capabilities are raised across the sets covered by `select`.
    ///
    /// A [`BufferState::New`] buffer is first populated from its target, so the answer reflects
    /// the target's real capabilities. Returns [`Coverage::Fail`] if the buffer could not be read
    /// from its target.
    pub fn have_capabilities(&mut self, select: Select) -> Coverage {
        if self.state == BufferState::New && self.get_caps_process().is_err() {
            return Coverage::Fail;
        }
        if self.state == BufferState::Error {
            return Coverage::Fail;
        }

        let mut any = false;
        let mut all = true;

        for (t, set) in self.sets.iter_types(select.types()) {
            if t == CapType::AMBIENT && !ambient::is_supported() {
                continue;
            }

            let present = set & self.supported;
            any |= !present.is_empty();
            all &= present == self.supported;
        }

        match (any, all) {
            (false, _) => Coverage::None,
            (true, true) => Coverage::Full,
            (true, false) => Coverage::Partial,
        }
    }
}

impl Default for CapNg {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
