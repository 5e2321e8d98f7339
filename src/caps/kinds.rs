use std::fmt;
use std::str::FromStr;

use super::{ambient, Cap};
use crate::{Error, Result};

/// Which group of capability sets a bulk operation (clear, fill, apply, query) addresses.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum Select {
    /// The effective, permitted and inheritable sets.
    Caps = 16,
    /// The bounding set.
    Bounds = 32,
    /// `Caps` and `Bounds`.
    Both = 48,
    /// The ambient set.
    Ambient = 64,
    /// All five sets.
    All = 112,
}

impl Select {
    const NAMES: [(&'static str, Select); 5] = [
        ("caps", Select::Caps),
        ("bounds", Select::Bounds),
        ("both", Select::Both),
        ("ambient", Select::Ambient),
        ("all", Select::All),
    ];

    #[inline]
    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Result<Self> {
        Self::NAMES
            .iter()
            .map(|(_, sel)| *sel)
            .find(|sel| sel.raw() == raw)
            .ok_or_else(|| Error::invalid(format!("unknown select value {}", raw)))
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Caps => "caps",
            Self::Bounds => "bounds",
            Self::Both => "both",
            Self::Ambient => "ambient",
            Self::All => "all",
        }
    }

    #[inline]
    pub fn covers_caps(self) -> bool {
        self.raw() & Self::Caps.raw() != 0
    }

    #[inline]
    pub fn covers_bounds(self) -> bool {
        self.raw() & Self::Bounds.raw() != 0
    }

    #[inline]
    pub fn covers_ambient(self) -> bool {
        self.raw() & Self::Ambient.raw() != 0
    }

    /// The individual sets this selection covers.
    pub fn types(self) -> CapType {
        let mut types = CapType::empty();
        if self.covers_caps() {
            types |= CapType::EFFECTIVE | CapType::PERMITTED | CapType::INHERITABLE;
        }
        if self.covers_bounds() {
            types |= CapType::BOUNDING_SET;
        }
        if self.covers_ambient() {
            types |= CapType::AMBIENT;
        }
        types
    }

    /// Whether the running kernel can act on this selection (the ambient set needs Linux 4.3+).
    pub fn is_supported(self) -> bool {
        !self.covers_ambient() || ambient::is_supported()
    }
}

impl FromStr for Select {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, sel)| *sel)
            .ok_or_else(|| Error::invalid(format!("unknown select name {}", s)))
    }
}

impl TryFrom<i32> for Select {
    type Error = Error;

    #[inline]
    fn try_from(raw: i32) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// One or more of the five capability sets, as used by single-capability updates and
    /// queries.
    pub struct CapType: u32 {
        const EFFECTIVE = 1;
        const PERMITTED = 2;
        const INHERITABLE = 4;
        const BOUNDING_SET = 8;
        const AMBIENT = 16;
    }
}

static CAP_TYPE_NAMES: [(&str, CapType); 5] = [
    ("effective", CapType::EFFECTIVE),
    ("permitted", CapType::PERMITTED),
    ("inheritable", CapType::INHERITABLE),
    ("bounding_set", CapType::BOUNDING_SET),
    ("ambient", CapType::AMBIENT),
];

impl CapType {
    #[inline]
    pub fn raw(self) -> i32 {
        self.bits() as i32
    }

    /// Accepts any non-empty combination of the set bits.
    pub fn from_raw(raw: i32) -> Result<Self> {
        u32::try_from(raw)
            .ok()
            .and_then(Self::from_bits)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::invalid(format!("unknown capability set type {}", raw)))
    }

    /// The individual set names in this combination, in bit order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        CAP_TYPE_NAMES
            .iter()
            .filter(move |(_, t)| self.contains(*t))
            .map(|(name, _)| *name)
    }

    pub fn is_supported(self) -> bool {
        !self.contains(Self::AMBIENT) || ambient::is_supported()
    }
}

impl FromStr for CapType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CAP_TYPE_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, t)| *t)
            .ok_or_else(|| Error::invalid(format!("unknown capability set name {}", s)))
    }
}

impl TryFrom<i32> for CapType {
    type Error = Error;

    #[inline]
    fn try_from(raw: i32) -> Result<Self> {
        Self::from_raw(raw)
    }
}

/// The direction of a single-capability update.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum Action {
    Drop = 0,
    Add = 1,
}

impl Action {
    #[inline]
    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Drop),
            1 => Ok(Self::Add),
            _ => Err(Error::invalid(format!("unknown action value {}", raw))),
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop" => Ok(Self::Drop),
            "add" => Ok(Self::Add),
            _ => Err(Error::invalid(format!("unknown action name {}", s))),
        }
    }
}

impl TryFrom<i32> for Action {
    type Error = Error;

    #[inline]
    fn try_from(raw: i32) -> Result<Self> {
        Self::from_raw(raw)
    }
}

bitflags::bitflags! {
    /// Options for [`CapNg::change_id()`](struct.CapNg.html#method.change_id).
    pub struct Flags: u32 {
        /// Drop all supplementary groups.
        const DROP_SUPP_GRP = 1;
        /// Empty the bounding set, whatever the buffer says.
        const CLEAR_BOUNDING = 2;
        /// Initialize the supplementary groups of the new account (takes precedence over
        /// `DROP_SUPP_GRP`).
        const INIT_SUPP_GRP = 4;
    }
}

impl Flags {
    /// Change the IDs and keep the buffered capabilities; nothing else.
    pub const NO_FLAG: Self = Self::empty();

    #[inline]
    pub fn raw(self) -> i32 {
        self.bits() as i32
    }

    pub fn from_raw(raw: i32) -> Result<Self> {
        u32::try_from(raw)
            .ok()
            .and_then(Self::from_bits)
            .ok_or_else(|| Error::invalid(format!("unknown flags {:#x}", raw)))
    }

    /// All of the flags are available on every kernel with capability support.
    #[inline]
    pub fn is_supported(self) -> bool {
        true
    }
}

/// How much of a selection is present in a buffer; the answer of
/// [`CapNg::have_capabilities()`](struct.CapNg.html#method.have_capabilities).
///
/// Variants are ordered by increasing coverage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(i32)]
pub enum Coverage {
    /// The buffer could not be read from its target.
    Fail = -1,
    None = 0,
    Partial = 1,
    Full = 2,
}

impl Coverage {
    #[inline]
    pub fn raw(self) -> i32 {
        self as i32
    }
}

/// A capability given either by number or by registry name.
///
/// This is resolved once, at the API boundary, by [`CapRef::resolve()`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CapRef<'a> {
    Code(u32),
    Name(&'a str),
}

impl CapRef<'_> {
    pub fn resolve(&self) -> Result<Cap> {
        match *self {
            Self::Code(code) => Cap::from_code(code).ok_or(Error::UnsupportedCapability(code)),
            Self::Name(name) => {
                Cap::from_name(name).ok_or_else(|| Error::UnknownCapability(name.to_string()))
            }
        }
    }
}

impl From<Cap> for CapRef<'_> {
    #[inline]
    fn from(cap: Cap) -> Self {
        Self::Code(cap.code())
    }
}

impl From<u32> for CapRef<'_> {
    #[inline]
    fn from(code: u32) -> Self {
        Self::Code(code)
    }
}

impl<'a> From<&'a str> for CapRef<'a> {
    #[inline]
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_values() {
        assert_eq!(Action::Drop.raw(), 0);
        assert_eq!(Action::Add.raw(), 1);

        assert_eq!(CapType::EFFECTIVE.raw(), 1);
        assert_eq!(CapType::PERMITTED.raw(), 2);
        assert_eq!(CapType::INHERITABLE.raw(), 4);
        assert_eq!(CapType::BOUNDING_SET.raw(), 8);
        assert_eq!(CapType::AMBIENT.raw(), 16);

        assert_eq!(Select::Caps.raw(), 16);
        assert_eq!(Select::Bounds.raw(), 32);
        assert_eq!(Select::Both.raw(), 48);
        assert_eq!(Select::Ambient.raw(), 64);
        assert_eq!(Select::All.raw(), 112);

        assert_eq!(Coverage::Fail.raw(), -1);
        assert_eq!(Coverage::None.raw(), 0);
        assert_eq!(Coverage::Partial.raw(), 1);
        assert_eq!(Coverage::Full.raw(), 2);

        assert_eq!(Flags::NO_FLAG.raw(), 0);
        assert_eq!(Flags::DROP_SUPP_GRP.raw(), 1);
        assert_eq!(Flags::CLEAR_BOUNDING.raw(), 2);
        assert_eq!(Flags::INIT_SUPP_GRP.raw(), 4);
    }

    #[test]
    fn test_select_parse() {
        for (name, sel) in Select::NAMES.iter() {
            assert_eq!(name.parse::<Select>().unwrap(), *sel);
            assert_eq!(Select::from_raw(sel.raw()).unwrap(), *sel);
            assert_eq!(Select::try_from(sel.raw()).unwrap(), *sel);
            assert_eq!(sel.to_string(), *name);
        }

        assert!(matches!("CAPS".parse::<Select>(), Err(Error::InvalidArgument(_))));
        assert!(matches!(Select::from_raw(0), Err(Error::InvalidArgument(_))));
        assert!(matches!(Select::from_raw(17), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_select_coverage() {
        assert_eq!(
            Select::Caps.types(),
            CapType::EFFECTIVE | CapType::PERMITTED | CapType::INHERITABLE
        );
        assert_eq!(Select::Bounds.types(), CapType::BOUNDING_SET);
        assert_eq!(Select::Both.types(), Select::Caps.types() | CapType::BOUNDING_SET);
        assert_eq!(Select::Ambient.types(), CapType::AMBIENT);
        assert_eq!(Select::All.types(), CapType::all());

        assert!(Select::Both.covers_caps() && Select::Both.covers_bounds());
        assert!(!Select::Both.covers_ambient());
        assert!(Select::Caps.is_supported());
        assert_eq!(Select::All.is_supported(), ambient::is_supported());
    }

    #[test]
    fn test_captype_parse() {
        assert_eq!("effective".parse::<CapType>().unwrap(), CapType::EFFECTIVE);
        assert_eq!("bounding_set".parse::<CapType>().unwrap(), CapType::BOUNDING_SET);
        assert!("bounding".parse::<CapType>().is_err());

        assert_eq!(CapType::from_raw(7).unwrap(), Select::Caps.types());
        assert!(CapType::from_raw(0).is_err());
        assert!(CapType::from_raw(32).is_err());
        assert!(CapType::from_raw(-1).is_err());

        assert_eq!(
            (CapType::EFFECTIVE | CapType::AMBIENT).names().collect::<Vec<_>>(),
            vec!["effective", "ambient"]
        );
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("add".parse::<Action>().unwrap(), Action::Add);
        assert_eq!("drop".parse::<Action>().unwrap(), Action::Drop);
        assert!("raise".parse::<Action>().is_err());
        assert_eq!(Action::try_from(1).unwrap(), Action::Add);
        assert!(Action::from_raw(2).is_err());
    }

    #[test]
    fn test_flags() {
        assert_eq!(Flags::from_raw(0).unwrap(), Flags::NO_FLAG);
        assert_eq!(
            Flags::from_raw(3).unwrap(),
            Flags::DROP_SUPP_GRP | Flags::CLEAR_BOUNDING
        );
        assert!(Flags::from_raw(8).is_err());
        assert!(Flags::all().is_supported());
    }

    #[test]
    fn test_coverage_order() {
        assert!(Coverage::Fail < Coverage::None);
        assert!(Coverage::None < Coverage::Partial);
        assert!(Coverage::Partial < Coverage::Full);
    }

    #[test]
    fn test_capref_resolve() {
        assert_eq!(CapRef::from(Cap::KILL).resolve().unwrap(), Cap::KILL);
        assert_eq!(CapRef::from(12u32).resolve().unwrap(), Cap::NET_ADMIN);
        assert_eq!(CapRef::from("sys_chroot").resolve().unwrap(), Cap::SYS_CHROOT);

        assert!(matches!(
            CapRef::from(200u32).resolve(),
            Err(Error::UnsupportedCapability(200))
        ));
        assert!(matches!(
            CapRef::from("bogus").resolve(),
            Err(Error::UnknownCapability(ref name)) if name == "bogus"
        ));
    }
}
