//! Policy-routing backend driver (ip rule / ip route).
//!
//! One fwmark rule points marked packets at a dedicated routing table whose
//! only content is a default route into the tunnel interface.

use std::net::Ipv4Addr;

use anyhow::Result;
use tracing::{debug, warn};

use crate::chain::PROXY_MARK;
use crate::exec::{args, run_checked, Exec};

/// Dedicated routing table owned by transtunnel.
pub const ROUTE_TABLE: u32 = 100;

/// Public anchor probed to learn the host's outbound source address. Never
/// contacted; `ip route get` only consults the routing table.
const PROBE_ANCHOR: &str = "1.1.1.1";

/// Interrupted runs can stack duplicate rules; deletion loops this often
/// before giving up.
const RULE_DEL_ATTEMPTS: usize = 16;

/// Install the fwmark rule and the tunnel default route.
pub fn install(exec: &dyn Exec, tun_iface: &str) -> Result<()> {
    let mark = PROXY_MARK.to_string();
    let table = ROUTE_TABLE.to_string();
    run_checked(exec, "ip", &["rule", "add", "fwmark", &mark, "lookup", &table])?;
    run_checked(
        exec,
        "ip",
        &["route", "replace", "default", "dev", tun_iface, "table", &table],
    )?;
    Ok(())
}

/// Remove the fwmark rule (all duplicates) and empty the routing table.
pub fn flush(exec: &dyn Exec) -> Result<()> {
    let mark = PROXY_MARK.to_string();
    let table = ROUTE_TABLE.to_string();

    for _ in 0..RULE_DEL_ATTEMPTS {
        let out = exec.run(
            "ip",
            &args(&["rule", "del", "fwmark", &mark, "lookup", &table]),
        )?;
        if !out.success {
            break;
        }
    }

    if let Err(err) = run_checked(exec, "ip", &["route", "flush", "table", &table]) {
        // An empty or never-created table is a failure on some kernels
        warn!("Routing table {table} not flushed: {err:#}");
    }
    Ok(())
}

/// The source address the kernel would pick for a public destination, or
/// `None` when the host has no usable default route. Non-fatal either way.
pub fn outbound_source(exec: &dyn Exec) -> Option<Ipv4Addr> {
    match exec.run("ip", &args(&["route", "get", PROBE_ANCHOR])) {
        Ok(out) if out.success => {
            let addr = parse_route_source(&out.stdout);
            debug!("Outbound source address: {addr:?}");
            addr
        }
        _ => {
            warn!("Could not discover the outbound source address");
            None
        }
    }
}

/// Pull the address following the `src` keyword out of `ip route get`
/// output.
fn parse_route_source(output: &str) -> Option<Ipv4Addr> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "src" {
            return tokens.next()?.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecOutput, MockExec};

    #[test]
    fn test_parse_route_source_typical_output() {
        let output = "1.1.1.1 via 192.168.1.1 dev eth0 src 192.168.1.10 uid 0\n    cache\n";
        assert_eq!(
            parse_route_source(output),
            Some("192.168.1.10".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_route_source_directly_connected() {
        let output = "1.1.1.1 dev ppp0 src 203.0.113.44\n";
        assert_eq!(
            parse_route_source(output),
            Some("203.0.113.44".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_route_source_missing_or_malformed() {
        assert_eq!(parse_route_source("unreachable 1.1.1.1"), None);
        assert_eq!(parse_route_source("1.1.1.1 dev eth0 src"), None);
        assert_eq!(parse_route_source("1.1.1.1 dev eth0 src garbage"), None);
        assert_eq!(parse_route_source(""), None);
    }

    #[test]
    fn test_flush_stops_deleting_when_no_rule_matches() {
        let mut mock = MockExec::new();
        // First delete succeeds (a rule existed), second reports none left
        let mut deletes = 0;
        mock.expect_run().returning(move |_, arg_list| {
            if arg_list.get(1).map(|a| a == "del").unwrap_or(false) {
                deletes += 1;
                Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    success: deletes == 1,
                })
            } else {
                Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    success: true,
                })
            }
        });

        assert!(flush(&mock).is_ok());
    }

    #[test]
    fn test_outbound_source_none_on_probe_failure() {
        let mut mock = MockExec::new();
        mock.expect_run().returning(|_, _| {
            Ok(ExecOutput {
                stdout: String::new(),
                stderr: "RTNETLINK answers: Network is unreachable".to_string(),
                success: false,
            })
        });
        assert_eq!(outbound_source(&mock), None);
    }
}
