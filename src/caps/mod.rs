use std::fmt;

mod buffer;
mod capset;
mod capstate;
mod commit;
mod file;
mod ids;
mod kinds;
mod print;
mod procstatus;
mod snapshot;

pub mod ambient;
pub mod bounding;
pub use buffer::{BufferState, CapNg, CapSets, Target};
pub use capset::{CapSet, CapSetIterator};
pub use capstate::CapState;
pub use file::FileCaps;
pub use ids::ChangeIdStage;
pub use kinds::{Action, CapRef, CapType, Coverage, Flags, Select};
pub use snapshot::SavedState;

/// An enum representing all of the Linux capabilities in the registry.
///
/// The discriminants are the kernel's capability numbers.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
#[allow(non_camel_case_types)]
#[non_exhaustive]
pub enum Cap {
    CHOWN = 0,
    DAC_OVERRIDE = 1,
    DAC_READ_SEARCH = 2,
    FOWNER = 3,
    FSETID = 4,
    KILL = 5,
    SETGID = 6,
    SETUID = 7,
    SETPCAP = 8,
    LINUX_IMMUTABLE = 9,
    NET_BIND_SERVICE = 10,
    NET_BROADCAST = 11,
    NET_ADMIN = 12,
    NET_RAW = 13,
    IPC_LOCK = 14,
    IPC_OWNER = 15,
    SYS_MODULE = 16,
    SYS_RAWIO = 17,
    SYS_CHROOT = 18,
    SYS_PTRACE = 19,
    SYS_PACCT = 20,
    SYS_ADMIN = 21,
    SYS_BOOT = 22,
    SYS_NICE = 23,
    SYS_RESOURCE = 24,
    SYS_TIME = 25,
    SYS_TTY_CONFIG = 26,
    MKNOD = 27,
    LEASE = 28,
    AUDIT_WRITE = 29,
    AUDIT_CONTROL = 30,
    SETFCAP = 31,
    MAC_OVERRIDE = 32,
    MAC_ADMIN = 33,
    SYSLOG = 34,
    WAKE_ALARM = 35,
    BLOCK_SUSPEND = 36,
    AUDIT_READ = 37,
    PERFMON = 38,
    BPF = 39,
    CHECKPOINT_RESTORE = 40,
}

// Must be the highest variant above; `Cap::from_u8()` transmutes every value up to it.
const LAST_CAP: Cap = Cap::CHECKPOINT_RESTORE;

const CAP_MAX: u8 = LAST_CAP as u8;
const NUM_CAPS: u8 = CAP_MAX + 1;
const CAP_BITMASK: u64 = (1u64 << NUM_CAPS) - 1;

/// Registry names, indexed by capability number.
static CAP_NAMES: [&str; NUM_CAPS as usize] = [
    "chown",
    "dac_override",
    "dac_read_search",
    "fowner",
    "fsetid",
    "kill",
    "setgid",
    "setuid",
    "setpcap",
    "linux_immutable",
    "net_bind_service",
    "net_broadcast",
    "net_admin",
    "net_raw",
    "ipc_lock",
    "ipc_owner",
    "sys_module",
    "sys_rawio",
    "sys_chroot",
    "sys_ptrace",
    "sys_pacct",
    "sys_admin",
    "sys_boot",
    "sys_nice",
    "sys_resource",
    "sys_time",
    "sys_tty_config",
    "mknod",
    "lease",
    "audit_write",
    "audit_control",
    "setfcap",
    "mac_override",
    "mac_admin",
    "syslog",
    "wake_alarm",
    "block_suspend",
    "audit_read",
    "perfmon",
    "bpf",
    "checkpoint_restore",
];

impl Cap {
    /// Return an iterator over every capability in the registry, in numeric order.
    ///
    /// The iterator is `Clone`, so an enumeration can be restarted from any point.
    #[inline]
    pub fn iter() -> CapIter {
        CapIter { codes: 0..NUM_CAPS }
    }

    #[inline]
    fn from_u8(val: u8) -> Option<Self> {
        if val <= CAP_MAX {
            Some(unsafe { std::mem::transmute::<u8, Cap>(val) })
        } else {
            None
        }
    }

    /// Look up a capability by its kernel number.
    #[inline]
    pub fn from_code(code: u32) -> Option<Self> {
        if code <= CAP_MAX as u32 {
            Self::from_u8(code as u8)
        } else {
            None
        }
    }

    /// Look up a capability by its registry name (e.g. `"sys_admin"`).
    ///
    /// Matching is exact and case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        CAP_NAMES
            .iter()
            .position(|n| *n == name)
            .and_then(|i| Self::from_u8(i as u8))
    }

    /// The kernel number of this capability.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// The registry name of this capability (e.g. `"net_admin"`).
    #[inline]
    pub fn name(self) -> &'static str {
        CAP_NAMES[self as usize]
    }

    #[inline]
    fn to_single_bitfield(self) -> u64 {
        debug_assert!((self as u8) <= CAP_MAX);

        1u64 << (self as u8)
    }

    /// Whether the running kernel knows this capability.
    pub fn is_supported(self) -> bool {
        bounding::read(self).is_some()
    }

    /// The set of registry capabilities that the running kernel knows.
    pub fn probe_supported() -> CapSet {
        let codes: Vec<u8> = (0..NUM_CAPS).collect();

        // Supported capabilities form a prefix of the registry
        let n = codes.partition_point(|&code| Self::from_u8(code).map_or(false, Self::is_supported));

        CapSet::from_bitmask_truncate((1u64 << n) - 1)
    }
}

/// Represents an error when parsing a `Cap` from a string.
#[derive(Clone, Eq, PartialEq)]
pub struct ParseCapError(());

impl fmt::Debug for ParseCapError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unknown capability")
    }
}

impl fmt::Display for ParseCapError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for ParseCapError {}

impl std::str::FromStr for Cap {
    type Err = ParseCapError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or(ParseCapError(()))
    }
}

impl fmt::Display for Cap {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Get the registry name of a capability number, or `"unknown"` if there is none.
pub fn capability_to_name(code: u32) -> &'static str {
    Cap::from_code(code).map_or("unknown", Cap::name)
}

/// Resolve a registry name to its capability number.
pub fn name_to_capability(name: &str) -> crate::Result<u32> {
    Cap::from_name(name)
        .map(Cap::code)
        .ok_or_else(|| crate::Error::UnknownCapability(name.to_string()))
}

/// Enumerate the `(code, name)` pairs of the registry in declaration order.
pub fn capabilities() -> impl Iterator<Item = (u32, &'static str)> + Clone {
    Cap::iter().map(|cap| (cap.code(), cap.name()))
}

/// An iterator over every capability in the registry, from [`Cap::iter()`].
#[derive(Clone, Debug)]
pub struct CapIter {
    codes: std::ops::Range<u8>,
}

impl Iterator for CapIter {
    type Item = Cap;

    #[inline]
    fn next(&mut self) -> Option<Cap> {
        self.codes.next().and_then(Cap::from_u8)
    }

    #[inline]
    fn nth(&mut self, n: usize) -> Option<Cap> {
        self.codes.nth(n).and_then(Cap::from_u8)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.codes.size_hint()
    }
}

impl DoubleEndedIterator for CapIter {
    #[inline]
    fn next_back(&mut self) -> Option<Cap> {
        self.codes.next_back().and_then(Cap::from_u8)
    }
}

impl ExactSizeIterator for CapIter {}

impl std::iter::FusedIterator for CapIter {}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_cap_codes() {
        for (i, cap) in Cap::iter().enumerate() {
            assert_eq!(cap.code(), i as u32);
            assert_eq!(Cap::from_code(i as u32), Some(cap));
        }

        assert_eq!(Cap::from_code(NUM_CAPS as u32), None);
        assert_eq!(Cap::from_code(u32::MAX), None);
        assert_eq!(Cap::SYS_ADMIN.code(), 21);
        assert_eq!(Cap::SYS_CHROOT.code(), 18);
    }

    #[test]
    fn test_cap_names() {
        assert_eq!(Cap::from_str("chown"), Ok(Cap::CHOWN));
        assert_eq!(Cap::from_str("sys_chroot"), Ok(Cap::SYS_CHROOT));
        assert_eq!(Cap::from_str("checkpoint_restore"), Ok(Cap::CHECKPOINT_RESTORE));

        assert!(Cap::from_str("").is_err());
        assert!(Cap::from_str("CHOWN").is_err());
        assert!(Cap::from_str("CAP_CHOWN").is_err());
        assert!(Cap::from_str("Sys_Chroot").is_err());
        assert!(Cap::from_str("noexist").is_err());

        assert_eq!(Cap::NET_ADMIN.to_string(), "net_admin");
        assert_eq!(ParseCapError(()).to_string(), "Unknown capability");
    }

    #[test]
    fn test_registry_round_trip() {
        for (code, name) in capabilities() {
            assert_eq!(name_to_capability(capability_to_name(code)).unwrap(), code);
            assert_eq!(capability_to_name(name_to_capability(name).unwrap()), name);
            assert!(name.bytes().all(|b| b.is_ascii_lowercase() || b == b'_'));
        }

        assert_eq!(capability_to_name(NUM_CAPS as u32), "unknown");
        assert_eq!(capability_to_name(1000), "unknown");

        match name_to_capability("net_nothing") {
            Err(crate::Error::UnknownCapability(name)) => assert_eq!(name, "net_nothing"),
            res => panic!("unexpected result {:?}", res),
        }
    }

    #[test]
    fn test_registry_enumeration() {
        let all: Vec<_> = capabilities().collect();
        assert_eq!(all.len(), NUM_CAPS as usize);
        assert_eq!(all[0], (0, "chown"));
        assert_eq!(all[21], (21, "sys_admin"));

        // Restartable and unique
        assert_eq!(capabilities().collect::<Vec<_>>(), all);
        let mut names: Vec<_> = all.iter().map(|(_, n)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }

    #[test]
    fn test_cap_iter() {
        let mut it = Cap::iter();
        assert_eq!(it.len(), NUM_CAPS as usize);
        assert_eq!(it.next(), Some(Cap::CHOWN));
        assert_eq!(it.next_back(), Some(LAST_CAP));
        assert_eq!(it.len(), NUM_CAPS as usize - 2);

        // Restarting from a clone
        let rest: Vec<_> = it.clone().collect();
        assert_eq!(rest.len(), it.len());
        assert_eq!(it.nth(0), Some(Cap::DAC_OVERRIDE));

        assert_eq!(Cap::iter().last(), Some(LAST_CAP));
        assert_eq!(Cap::iter().nth(21), Some(Cap::SYS_ADMIN));
        assert_eq!(Cap::iter().nth(NUM_CAPS as usize), None);
        assert!(Cap::iter().rev().eq((0..NUM_CAPS).rev().filter_map(Cap::from_u8)));

        for _ in it.by_ref() {}
        assert_eq!(it.len(), 0);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_cap_bits() {
        let mut mask: u64 = 0;

        for cap in Cap::iter() {
            let cap_bits = cap.to_single_bitfield();
            assert_eq!(2u64.pow(cap as u32), cap_bits);
            mask |= cap_bits;
        }

        assert_eq!(mask, CAP_BITMASK);
    }

    #[test]
    fn test_supported_caps() {
        let supported_caps = Cap::probe_supported();

        for cap in Cap::iter() {
            assert_eq!(supported_caps.has(cap), cap.is_supported());
        }
        // Every kernel with capget v3 has at least these
        assert!(supported_caps.has(Cap::SETFCAP));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_cap_serde() {
        use serde_test::{assert_tokens, Token};

        assert_tokens(
            &Cap::NET_RAW,
            &[Token::UnitVariant {
                name: "Cap",
                variant: "NET_RAW",
            }],
        );
    }
}
