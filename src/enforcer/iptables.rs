//! Packet-rule backend driver (iptables, mangle table).
//!
//! Install renders the whole decision chain into a single
//! `iptables-restore --noflush` script (atomic bulk replace); flush goes
//! through save → filter → restore, removing exactly the lines that carry
//! the reserved chain prefix and nothing else.

use anyhow::Result;
use tracing::debug;

use crate::chain::{Action, Binding, DecisionChain, MatchCondition, Rule};
use crate::exec::{run_checked, run_with_input_checked, Exec};

/// Reserved name prefix for every chain this system owns.
pub const CHAIN_PREFIX: &str = "TRANSTUNNEL_";

/// Install the compiled chain in one restore transaction.
pub fn install(exec: &dyn Exec, chain: &DecisionChain) -> Result<()> {
    let script = render_restore_script(chain);
    debug!("iptables-restore script:\n{script}");
    run_with_input_checked(exec, "iptables-restore", &["--noflush"], &script)?;
    Ok(())
}

/// Remove every installed rule and chain under the reserved prefix.
pub fn flush(exec: &dyn Exec) -> Result<()> {
    let saved = run_checked(exec, "iptables-save", &[])?;
    match filter_saved(&saved) {
        Some(filtered) => {
            run_with_input_checked(exec, "iptables-restore", &[], &filtered)?;
        }
        None => debug!("No owned packet rules present"),
    }
    Ok(())
}

/// Drop every saved line referencing an owned chain; `None` when nothing
/// owned is present, so flush can skip the restore entirely.
pub fn filter_saved(saved: &str) -> Option<String> {
    if !saved.contains(CHAIN_PREFIX) {
        return None;
    }
    let mut filtered: String = saved
        .lines()
        .filter(|line| !line.contains(CHAIN_PREFIX))
        .collect::<Vec<_>>()
        .join("\n");
    filtered.push('\n');
    Some(filtered)
}

/// Render the chain as an `iptables-restore --noflush` script for the
/// mangle table. Chain declarations come first, then the rule bodies, then
/// the hook bindings inserted at the top positions of the built-in chains.
pub fn render_restore_script(chain: &DecisionChain) -> String {
    let mut script = String::from("*mangle\n");

    for (id, _) in &chain.chains {
        script.push_str(&format!(":{} - [0:0]\n", id.chain_name()));
    }

    for (id, rules) in &chain.chains {
        for rule in rules {
            script.push_str(&render_rule(id.chain_name(), rule));
        }
    }

    let mut prerouting_pos = 0;
    for binding in &chain.bindings {
        match binding {
            Binding::Prerouting { chain, iface } => {
                prerouting_pos += 1;
                let mut line = format!("-I PREROUTING {prerouting_pos}");
                if let Some(name) = iface {
                    line.push_str(&format!(" -i {name}"));
                }
                line.push_str(&format!(" -j {}\n", chain.chain_name()));
                script.push_str(&line);
            }
            Binding::Output { chain } => {
                script.push_str(&format!("-I OUTPUT 1 -j {}\n", chain.chain_name()));
            }
        }
    }

    script.push_str("COMMIT\n");
    script
}

fn render_rule(chain_name: &str, rule: &Rule) -> String {
    let mut line = format!("-A {chain_name}");
    match &rule.condition {
        MatchCondition::SrcSet(set) => {
            line.push_str(&format!(" -m set --match-set {} src", set.store_name()));
        }
        MatchCondition::DstSet(set) => {
            line.push_str(&format!(" -m set --match-set {} dst", set.store_name()));
        }
        MatchCondition::Mark(mark) => line.push_str(&format!(" -m mark --mark {mark}")),
        MatchCondition::Always => {}
    }
    if let Some(extra) = &rule.extra {
        line.push_str(&format!(" {}", extra.trim()));
    }
    match rule.action {
        Action::Return => line.push_str(" -j RETURN"),
        Action::Jump(target) => line.push_str(&format!(" -j {}", target.chain_name())),
        Action::SetMark(value) => line.push_str(&format!(" -j MARK --set-mark {value}")),
    }
    line.push('\n');
    line
}
