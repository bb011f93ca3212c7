//! Address set construction.
//!
//! Six named membership sets feed the decision chain. Five come from
//! user-supplied list files; `dst_special` is assembled from the
//! reserved-range table, the literal server addresses and the host's own
//! outbound source address. The chain consults `dst_special` first in every
//! policy path, so nothing in it can ever be proxied.

use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use ipnet::Ipv4Net;
use tracing::{debug, warn};

use crate::error::TransTunnelError;
use crate::policy::Policy;

/// Reserved and special-purpose IPv4 ranges that must never be proxied.
pub const RESERVED_NETS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.31.196.0/24",
    "192.52.193.0/24",
    "192.88.99.0/24",
    "192.168.0.0/16",
    "192.175.48.0/24",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "255.255.255.255",
];

/// The six set identities, each owning a name under the reserved prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetName {
    SrcDirect,
    SrcProxy,
    SrcNormal,
    DstDirect,
    DstProxy,
    DstSpecial,
}

impl SetName {
    pub const ALL: [SetName; 6] = [
        SetName::SrcDirect,
        SetName::SrcProxy,
        SetName::SrcNormal,
        SetName::DstDirect,
        SetName::DstProxy,
        SetName::DstSpecial,
    ];

    /// Name of the set in the membership store.
    pub fn store_name(self) -> &'static str {
        match self {
            Self::SrcDirect => "transtunnel_src_direct",
            Self::SrcProxy => "transtunnel_src_proxy",
            Self::SrcNormal => "transtunnel_src_normal",
            Self::DstDirect => "transtunnel_dst_direct",
            Self::DstProxy => "transtunnel_dst_proxy",
            Self::DstSpecial => "transtunnel_dst_special",
        }
    }
}

/// A named membership set. Entries are raw tokens; syntax is the store's
/// problem, not ours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressSet {
    pub entries: Vec<String>,
}

impl AddressSet {
    /// Membership test used by the chain simulator. A bare address is an
    /// exact-host member; unparseable entries never match.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.entries.iter().any(|entry| {
            if let Ok(net) = entry.parse::<Ipv4Net>() {
                net.contains(&addr)
            } else if let Ok(host) = entry.parse::<Ipv4Addr>() {
                host == addr
            } else {
                false
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All six sets of one run. Rebuilt wholesale on every install.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressSets {
    pub src_direct: AddressSet,
    pub src_proxy: AddressSet,
    pub src_normal: AddressSet,
    pub dst_direct: AddressSet,
    pub dst_proxy: AddressSet,
    pub dst_special: AddressSet,
}

impl AddressSets {
    pub fn get(&self, name: SetName) -> &AddressSet {
        match name {
            SetName::SrcDirect => &self.src_direct,
            SetName::SrcProxy => &self.src_proxy,
            SetName::SrcNormal => &self.src_normal,
            SetName::DstDirect => &self.dst_direct,
            SetName::DstProxy => &self.dst_proxy,
            SetName::DstSpecial => &self.dst_special,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SetName, &AddressSet)> {
        SetName::ALL.iter().map(move |name| (*name, self.get(*name)))
    }
}

/// Build all six sets from the policy's list files.
///
/// `local_addr` is the host's outbound source address when the routing
/// probe succeeded; it joins the servers in `dst_special` so the host's own
/// control-plane traffic is never captured.
pub fn build(policy: &Policy, local_addr: Option<Ipv4Addr>) -> AddressSets {
    let mut sets = AddressSets {
        src_direct: read_lists(&policy.lists.src_direct),
        src_proxy: read_lists(&policy.lists.src_proxy),
        src_normal: read_lists(&policy.lists.src_normal),
        dst_direct: read_lists(&policy.lists.dst_direct),
        dst_proxy: read_lists(&policy.lists.dst_proxy),
        dst_special: AddressSet::default(),
    };

    let special = &mut sets.dst_special.entries;
    special.extend(RESERVED_NETS.iter().map(|net| net.to_string()));
    for server in &policy.servers {
        // Hostnames stay out; the resolver is not consulted here
        if server.parse::<Ipv4Addr>().is_ok() {
            special.push(server.clone());
        }
    }
    if let Some(addr) = local_addr {
        special.push(addr.to_string());
    }

    debug!(
        "Built sets: src {}/{}/{}, dst {}/{}, special {}",
        sets.src_direct.len(),
        sets.src_proxy.len(),
        sets.src_normal.len(),
        sets.dst_direct.len(),
        sets.dst_proxy.len(),
        sets.dst_special.len()
    );
    sets
}

/// Best-effort concatenation of one category's list files. Blank lines and
/// `#` comments are dropped, tokens trimmed; an unreadable file is skipped
/// with a single warning.
fn read_lists(files: &[PathBuf]) -> AddressSet {
    let mut entries = Vec::new();
    for path in files {
        match fs::read_to_string(path) {
            Ok(content) => {
                entries.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty() && !line.starts_with('#'))
                        .map(str::to_string),
                );
            }
            Err(err) => {
                let problem =
                    TransTunnelError::Input(format!("{}: {}", path.display(), err));
                warn!("{problem}");
            }
        }
    }
    AddressSet { entries }
}
