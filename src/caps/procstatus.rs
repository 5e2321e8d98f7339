use std::fs;
use std::io;
use std::io::prelude::*;

use super::{CapSet, CapSets};
use crate::Errno;

/// Read all five capability sets of `pid` from `/proc/<pid>/status`.
///
/// This is the only way to see another process's bounding and ambient sets. If `pid` is 0, the
/// calling thread is examined.
pub fn read_for_pid(mut pid: libc::pid_t) -> Result<CapSets, Errno> {
    match pid.cmp(&0) {
        std::cmp::Ordering::Less => return Err(Errno::from_code(libc::EINVAL)),
        std::cmp::Ordering::Equal => {
            pid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t
        }
        std::cmp::Ordering::Greater => (),
    }

    let f = match fs::File::open(format!("/proc/{}/status", pid)) {
        Ok(f) => f,
        Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
            return Err(Errno::from_code(libc::ESRCH))
        }
        Err(e) => return Err(e.into()),
    };

    parse_status(io::BufReader::new(f))
}

fn parse_status<R: BufRead>(mut reader: R) -> Result<CapSets, Errno> {
    let mut line = String::new();
    let mut res = CapSets::default();

    while reader.read_line(&mut line)? > 0 {
        if line.ends_with('\n') {
            line.pop();
        }

        if let Some(i) = line.find(":\t") {
            let set = match &line[..i] {
                "CapPrm" => &mut res.permitted,
                "CapEff" => &mut res.effective,
                "CapInh" => &mut res.inheritable,
                "CapBnd" => &mut res.bounding,
                "CapAmb" => &mut res.ambient,
                _ => {
                    line.clear();
                    continue;
                }
            };

            if line.len() > i + 2 {
                match u64::from_str_radix(&line[i + 2..], 16) {
                    Ok(bitmask) => *set = CapSet::from_bitmask_truncate(bitmask),
                    Err(_) => return Err(Errno::from_code(libc::EINVAL)),
                }
            }
        }

        line.clear();
    }

    Ok(res)
}
