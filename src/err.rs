use core::fmt;
use std::io;

use crate::caps::ChangeIdStage;

pub type Result<T> = core::result::Result<T, Error>;

/// A raw OS error (an `errno` value) returned by one of the capability syscalls.
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Errno(i32);

impl Errno {
    /// Get the last OS error that occured (i.e. the current `errno` value).
    #[inline]
    pub fn last() -> Self {
        Self(unsafe { *libc::__errno_location() })
    }

    /// Construct an `Errno` from an `errno` code.
    #[inline]
    pub fn from_code(eno: i32) -> Self {
        Self(eno)
    }

    /// Get the `errno` code represented by this `Errno` object.
    #[inline]
    pub fn code(&self) -> i32 {
        self.0
    }

    fn strerror(&self) -> &'static str {
        let msg = unsafe { std::ffi::CStr::from_ptr(libc::strerror(self.0)) };
        msg.to_str().unwrap_or("Unknown error")
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.strerror())?;
        write!(f, " (code {})", self.0)
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Errno")
            .field("code", &self.0)
            .field("message", &self.strerror())
            .finish()
    }
}

impl std::error::Error for Errno {}

impl From<Errno> for io::Error {
    #[inline]
    fn from(e: Errno) -> Self {
        Self::from_raw_os_error(e.0)
    }
}

impl From<io::Error> for Errno {
    #[inline]
    fn from(e: io::Error) -> Self {
        Self(e.raw_os_error().unwrap_or(libc::EIO))
    }
}

/// Errors returned by the high-level capability API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The kernel rejected a read or write of capability state.
    #[error("{0}")]
    Os(#[from] Errno),

    /// A symbolic capability name that is not in the registry.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// A capability code that the running kernel does not know about.
    #[error("Capability {0} is not supported by the running kernel")]
    UnsupportedCapability(u32),

    /// A select, action, set type or flag value of the wrong shape.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation needs a buffer that was populated, cleared or filled first.
    #[error("Capability state has not been initialized")]
    Uninitialized,

    /// Changing the UID/GID failed. The caller must not assume the new identity.
    #[error("Changing credentials failed while {stage}: {source}")]
    ChangeId {
        stage: ChangeIdStage,
        #[source]
        source: Errno,
    },
}

impl Error {
    /// The `errno` value behind this error, if it came from the kernel.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Os(e) => Some(e.code()),
            Self::ChangeId { source, .. } => Some(source.code()),
            _ => None,
        }
    }

    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(e: io::Error) -> Self {
        Self::Os(e.into())
    }
}
