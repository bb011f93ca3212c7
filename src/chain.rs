//! Decision chain compilation and simulation.
//!
//! The classification policy compiles into an immutable, ordered rule DAG:
//! four fixed sub-chains plus an optional output-path chain. Rules are
//! strictly first-match within each sub-chain — swapping the `src_proxy` /
//! `src_normal` checks would change outcomes for addresses listed in both,
//! so the ordering here is a contract, not an implementation detail.
//!
//! A changed policy produces an entirely new chain; nothing is ever mutated
//! in place. The packet-rule backend renders the value into firewall rules,
//! and [`DecisionChain::classify`] evaluates it directly for tests.

use std::net::Ipv4Addr;

use crate::policy::{DstDefault, Policy, SrcDefault};
use crate::sets::{AddressSets, SetName};

/// Mark applied to PROXY-classified packets; the policy-routing rule keys
/// on it.
pub const PROXY_MARK: u32 = 1;

/// The named sub-chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainId {
    Prepare,
    SourceClassify,
    DestinationClassify,
    Forward,
    SelfProxyPrepare,
}

impl ChainId {
    /// Name of the chain in the packet-rule backend.
    pub fn chain_name(self) -> &'static str {
        match self {
            Self::Prepare => "TRANSTUNNEL_PREPARE",
            Self::SourceClassify => "TRANSTUNNEL_SRC",
            Self::DestinationClassify => "TRANSTUNNEL_DST",
            Self::Forward => "TRANSTUNNEL_FORWARD",
            Self::SelfProxyPrepare => "TRANSTUNNEL_OUTPUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchCondition {
    SrcSet(SetName),
    DstSet(SetName),
    Mark(u32),
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop classification, packet left unmodified
    Return,
    Jump(ChainId),
    SetMark(u32),
}

/// One `(match, action)` node. `extra` carries the opaque pass-through
/// match expression when the rule is gated by it; the simulator treats it
/// as always true since its meaning belongs to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub condition: MatchCondition,
    pub extra: Option<String>,
    pub action: Action,
}

/// Where a sub-chain hooks into the packet path.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Routed traffic entering on one interface, or on any if `None`.
    Prerouting {
        chain: ChainId,
        iface: Option<String>,
    },
    /// Traffic generated by this host.
    Output { chain: ChainId },
}

/// The compiled classification policy.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionChain {
    pub chains: Vec<(ChainId, Vec<Rule>)>,
    pub bindings: Vec<Binding>,
}

/// A packet as the simulator sees it.
#[derive(Debug, Clone, Copy)]
pub struct Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub mark: u32,
}

/// Simulator outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The packet leaves the chain with its mark untouched
    Untouched,
    /// The packet was marked for proxy routing
    Marked(u32),
}

enum Flow {
    Stopped,
    FellThrough,
}

/// Compile the resolved policy into its decision chain. Pure: identical
/// policies always compile to identical chains.
pub fn compile(policy: &Policy) -> DecisionChain {
    let mut chains = Vec::new();

    // Prepare: special destinations stop classification before anything else.
    chains.push((
        ChainId::Prepare,
        vec![
            rule(MatchCondition::DstSet(SetName::DstSpecial), Action::Return),
            Rule {
                condition: MatchCondition::Always,
                extra: policy.extra_match.clone(),
                action: Action::Jump(ChainId::SourceClassify),
            },
        ],
    ));

    // SourceClassify: direct, proxy, normal, then the configured default.
    let src_fallback = match policy.src_default {
        SrcDefault::PassThrough => Action::Return,
        SrcDefault::ForwardToProxy => Action::Jump(ChainId::Forward),
        SrcDefault::EvaluateDestination => Action::Jump(ChainId::DestinationClassify),
    };
    chains.push((
        ChainId::SourceClassify,
        vec![
            rule(MatchCondition::SrcSet(SetName::SrcDirect), Action::Return),
            rule(
                MatchCondition::SrcSet(SetName::SrcProxy),
                Action::Jump(ChainId::Forward),
            ),
            rule(
                MatchCondition::SrcSet(SetName::SrcNormal),
                Action::Jump(ChainId::DestinationClassify),
            ),
            rule(MatchCondition::Always, src_fallback),
        ],
    ));

    let dst_fallback = match policy.dst_default {
        DstDefault::PassThrough => Action::Return,
        DstDefault::ForwardToProxy => Action::Jump(ChainId::Forward),
    };
    chains.push((
        ChainId::DestinationClassify,
        vec![
            rule(MatchCondition::DstSet(SetName::DstDirect), Action::Return),
            rule(
                MatchCondition::DstSet(SetName::DstProxy),
                Action::Jump(ChainId::Forward),
            ),
            rule(MatchCondition::Always, dst_fallback),
        ],
    ));

    chains.push((
        ChainId::Forward,
        vec![rule(MatchCondition::Always, Action::SetMark(PROXY_MARK))],
    ));

    if policy.self_proxy {
        chains.push((ChainId::SelfProxyPrepare, self_proxy_rules(policy)));
    }

    let mut bindings = Vec::new();
    if policy.ifaces.is_empty() {
        bindings.push(Binding::Prerouting {
            chain: ChainId::Prepare,
            iface: None,
        });
    } else {
        for iface in &policy.ifaces {
            bindings.push(Binding::Prerouting {
                chain: ChainId::Prepare,
                iface: Some(iface.clone()),
            });
        }
    }
    if policy.self_proxy {
        bindings.push(Binding::Output {
            chain: ChainId::SelfProxyPrepare,
        });
    }

    DecisionChain { chains, bindings }
}

/// Output-path rules. The skips keyed off `dst_default` drop checks whose
/// outcome the final fallback already implies; the mark test must stay
/// ahead of that fallback or the proxy client's own outbound traffic gets
/// re-captured and loops.
fn self_proxy_rules(policy: &Policy) -> Vec<Rule> {
    let mut rules = vec![rule(
        MatchCondition::DstSet(SetName::DstSpecial),
        Action::Return,
    )];
    if policy.dst_default != DstDefault::PassThrough {
        rules.push(rule(
            MatchCondition::DstSet(SetName::DstDirect),
            Action::Return,
        ));
    }
    if policy.dst_default != DstDefault::ForwardToProxy {
        rules.push(Rule {
            condition: MatchCondition::DstSet(SetName::DstProxy),
            extra: policy.extra_match.clone(),
            action: Action::SetMark(PROXY_MARK),
        });
    }
    if let Some(mark) = policy.exclusion_mark {
        rules.push(rule(MatchCondition::Mark(mark), Action::Return));
    }
    if policy.dst_default != DstDefault::PassThrough {
        rules.push(Rule {
            condition: MatchCondition::Always,
            extra: policy.extra_match.clone(),
            action: Action::SetMark(PROXY_MARK),
        });
    }
    rules
}

fn rule(condition: MatchCondition, action: Action) -> Rule {
    Rule {
        condition,
        extra: None,
        action,
    }
}

impl DecisionChain {
    pub fn rules(&self, id: ChainId) -> Option<&[Rule]> {
        self.chains
            .iter()
            .find(|(chain_id, _)| *chain_id == id)
            .map(|(_, rules)| rules.as_slice())
    }

    /// Evaluate the chain against one packet, starting at `entry`
    /// ([`ChainId::Prepare`] for routed traffic, [`ChainId::SelfProxyPrepare`]
    /// for host-originated traffic). Pure; consults only the given sets.
    pub fn classify(&self, sets: &AddressSets, packet: &Packet, entry: ChainId) -> Verdict {
        let mut mark = packet.mark;
        self.eval(entry, sets, packet, &mut mark);
        if mark != packet.mark {
            Verdict::Marked(mark)
        } else {
            Verdict::Untouched
        }
    }

    fn eval(&self, id: ChainId, sets: &AddressSets, packet: &Packet, mark: &mut u32) -> Flow {
        let Some(rules) = self.rules(id) else {
            return Flow::FellThrough;
        };
        for rule in rules {
            if !condition_matches(&rule.condition, sets, packet, *mark) {
                continue;
            }
            match rule.action {
                Action::Return => return Flow::Stopped,
                // Mark targets do not terminate; evaluation continues
                Action::SetMark(value) => *mark = value,
                Action::Jump(target) => {
                    if let Flow::Stopped = self.eval(target, sets, packet, mark) {
                        return Flow::Stopped;
                    }
                }
            }
        }
        Flow::FellThrough
    }
}

fn condition_matches(
    condition: &MatchCondition,
    sets: &AddressSets,
    packet: &Packet,
    mark: u32,
) -> bool {
    match condition {
        MatchCondition::SrcSet(name) => sets.get(*name).contains(packet.src),
        MatchCondition::DstSet(name) => sets.get(*name).contains(packet.dst),
        MatchCondition::Mark(value) => mark == *value,
        MatchCondition::Always => true,
    }
}
