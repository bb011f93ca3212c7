//! Set-membership store driver (ipset).
//!
//! Sets are created and bulk-loaded through one `ipset restore` script and
//! destroyed by prefix, never by name guessing, so teardown touches nothing
//! outside the reserved namespace.

use anyhow::Result;
use tracing::{debug, warn};

use crate::exec::{run_checked, run_with_input_checked, Exec};
use crate::sets::AddressSets;

/// Reserved name prefix for every set this system owns.
pub const SET_PREFIX: &str = "transtunnel_";

/// A bare address loads as an exact-host /32 member, so one set type covers
/// both hosts and CIDRs.
const SET_TYPE: &str = "hash:net";

/// Render the restore script creating and loading all six sets. Empty sets
/// are still created: the chain references them by name.
pub fn render_restore_script(sets: &AddressSets) -> String {
    let mut script = String::new();
    for (name, set) in sets.iter() {
        script.push_str(&format!(
            "create {} {} family inet\n",
            name.store_name(),
            SET_TYPE
        ));
        for entry in &set.entries {
            script.push_str(&format!("add {} {}\n", name.store_name(), entry));
        }
    }
    script
}

/// Create all six sets and bulk-load their members.
pub fn create_all(exec: &dyn Exec, sets: &AddressSets) -> Result<()> {
    let script = render_restore_script(sets);
    debug!("ipset restore script ({} lines)", script.lines().count());
    run_with_input_checked(exec, "ipset", &["restore", "-exist"], &script)?;
    Ok(())
}

/// Destroy every set under the reserved prefix. Individual failures are
/// logged and skipped so cleanup coverage stays maximal.
pub fn destroy_owned(exec: &dyn Exec) -> Result<()> {
    let listing = run_checked(exec, "ipset", &["list", "-n"])?;
    for name in listing
        .lines()
        .map(str::trim)
        .filter(|name| name.starts_with(SET_PREFIX))
    {
        if let Err(err) = run_checked(exec, "ipset", &["destroy", name]) {
            warn!("Could not destroy set {name}: {err:#}");
        }
    }
    Ok(())
}
