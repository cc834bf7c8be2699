//! Startup privilege check.
//!
//! Binding NFQUEUE queues needs `CAP_NET_ADMIN`; nfsieve requires an
//! effective uid of 0 and refuses to start otherwise.

use anyhow::Result;

/// Fail unless the process runs with effective uid 0.
pub fn ensure_root() -> Result<()> {
    check_euid(effective_uid())
}

fn check_euid(euid: u32) -> Result<()> {
    if euid != 0 {
        return Err(anyhow::anyhow!(
            "nfsieve must run as root (effective uid is {})",
            euid
        ));
    }
    tracing::debug!("running with effective uid 0");
    Ok(())
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
fn effective_uid() -> u32 {
    u32::MAX
}
