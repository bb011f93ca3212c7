//! Firewall-facing backend drivers and environment preconditions.

pub mod iproute;
pub mod ipset;
pub mod iptables;

use anyhow::Result;

use crate::error::TransTunnelError;
use crate::exec::{args, Exec};

/// Tools the backends shell out to. All must be present before any mutation.
const REQUIRED_TOOLS: &[&str] = &["ipset", "iptables", "iptables-save", "iptables-restore", "ip"];

/// Check for root privileges (effective UID 0). Firewall, set and routing
/// mutations all require them.
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid reads the effective UID; it has no preconditions and
    // cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Err(TransTunnelError::Environment(
            "root privileges are required to manage firewall state (run with sudo)".into(),
        )
        .into());
    }
    Ok(())
}

/// Probe required tools and the kernel's mark-match support. Runs before
/// any mutation so an unmet precondition aborts with no partial state.
pub fn check_environment(exec: &dyn Exec) -> Result<()> {
    for tool in REQUIRED_TOOLS {
        // Presence means the process could be spawned at all; the exit
        // status of --version is irrelevant.
        if exec.run(tool, &args(&["--version"])).is_err() {
            return Err(TransTunnelError::Environment(format!(
                "required tool '{tool}' is not available"
            ))
            .into());
        }
    }

    // mark-based matching is compiled out on some embedded kernels
    let probe = exec.run("iptables", &args(&["-m", "mark", "--help"]));
    if !probe.map(|out| out.success).unwrap_or(false) {
        return Err(TransTunnelError::Environment(
            "iptables lacks mark-match support (xt_mark)".into(),
        )
        .into());
    }

    Ok(())
}
