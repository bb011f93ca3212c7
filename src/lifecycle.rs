//! Rule lifecycle orchestration.
//!
//! `install` and `flush` are both idempotent and safe after a partial prior
//! failure. `flush` removes every artifact under the two reserved prefixes
//! and nothing else; `install` always begins with a flush, so a re-run never
//! collides with leftover chain or set names (the backend forbids duplicate
//! active chains). Ordering is the correctness mechanism: rules go before
//! the sets they reference on teardown, and after them on install.

use anyhow::Result;
use tracing::{info, warn};

use crate::chain::{self, DecisionChain};
use crate::cli::Cli;
use crate::enforcer::{self, iproute, ipset, iptables};
use crate::exec::{Exec, SystemExec};
use crate::lock::LockGuard;
use crate::policy::{self, Policy};
use crate::sets::{self, AddressSets};

/// Remove everything transtunnel installed. Each sub-step is attempted
/// independently; a missing artifact is not an error, so this degrades
/// gracefully on hosts where nothing (or only part) was ever installed.
pub fn flush(exec: &dyn Exec) {
    info!("Removing classification rules");
    if let Err(err) = iptables::flush(exec) {
        warn!("Packet-rule cleanup incomplete: {err:#}");
    }

    info!("Removing policy route");
    if let Err(err) = iproute::flush(exec) {
        warn!("Policy-route cleanup incomplete: {err:#}");
    }

    info!("Destroying address sets");
    if let Err(err) = ipset::destroy_owned(exec) {
        warn!("Address-set cleanup incomplete: {err:#}");
    }
}

/// Flush, then rebuild sets, routes and the decision chain. A backend
/// failure aborts immediately; the partially rebuilt state is cleaned up by
/// the next run's leading flush.
pub fn install(
    exec: &dyn Exec,
    policy: &Policy,
    sets: &AddressSets,
    chain: &DecisionChain,
) -> Result<()> {
    flush(exec);

    info!("Creating address sets");
    ipset::create_all(exec, sets)?;

    info!("Installing policy route via {}", policy.tun_iface);
    iproute::install(exec, &policy.tun_iface)?;

    info!("Installing decision chain");
    iptables::install(exec, chain)?;

    Ok(())
}

/// Full run entry point: validation, environment checks, then the lifecycle.
///
/// Validation runs before the privilege check so a misconfigured command
/// line is reported even without root. Nothing mutates until both checks
/// and the instance lock have passed.
pub fn run(cli: &Cli) -> Result<()> {
    let exec = SystemExec;

    if cli.flush {
        enforcer::check_root()?;
        enforcer::check_environment(&exec)?;
        let _lock = LockGuard::acquire()?;
        flush(&exec);
        info!("Flush complete");
        return Ok(());
    }

    let policy = policy::resolve(cli)?;
    enforcer::check_root()?;
    enforcer::check_environment(&exec)?;
    let _lock = LockGuard::acquire()?;

    let local_addr = iproute::outbound_source(&exec);
    let sets = sets::build(&policy, local_addr);
    let chain = chain::compile(&policy);

    install(&exec, &policy, &sets, &chain)?;
    info!("Install complete");
    Ok(())
}
