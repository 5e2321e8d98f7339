//! Staged management of Linux process and file capabilities.
//!
//! The central type is [`CapNg`], an in-memory buffer holding all five capability sets
//! (effective, permitted, inheritable, bounding and ambient) of a target. The buffer is filled
//! from the kernel, edited with [`CapNg::update()`], [`CapNg::clear()`] and [`CapNg::fill()`],
//! and then pushed back with [`CapNg::apply()`] or [`CapNg::apply_caps_file()`]. Nothing touches
//! the kernel between those two points, so several changes become a single transition.
//!
//! ```no_run
//! use capng::{Action, Cap, CapNg, CapType, Select};
//!
//! # fn main() -> capng::Result<()> {
//! let mut caps = CapNg::current_process()?;
//! caps.update(Action::Drop, CapType::EFFECTIVE | CapType::PERMITTED, Cap::NET_ADMIN)?;
//! caps.apply(Select::Caps)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Threads
//!
//! Linux keeps capabilities per *thread*. Every kernel operation in this crate acts on the
//! calling thread only; a multithreaded program must apply the same state in each thread (or
//! drop privileges before spawning threads).

mod err;
mod sys;

pub mod caps;
pub mod prctl;

pub use caps::*;
pub use err::{Errno, Error, Result};

#[inline]
unsafe fn raw_prctl(
    option: libc::c_int,
    arg2: libc::c_ulong,
    arg3: libc::c_ulong,
    arg4: libc::c_ulong,
    arg5: libc::c_ulong,
) -> core::result::Result<libc::c_int, Errno> {
    let res = libc::prctl(option, arg2, arg3, arg4, arg5);

    if res >= 0 {
        Ok(res)
    } else {
        Err(Errno::last())
    }
}
