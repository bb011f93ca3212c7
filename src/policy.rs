//! Policy resolution: user-facing tokens into the internal classification
//! model.
//!
//! This is where the configuration's real branching lives. Everything
//! downstream (set building, chain compilation, installation) consumes the
//! resolved [`Policy`] value and never looks at the CLI again.

use anyhow::Result;
use std::path::PathBuf;
use tracing::warn;

use crate::cli::{split_list, Cli};
use crate::error::TransTunnelError;

/// Treatment for sources that match no source set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SrcDefault {
    /// Leave traffic unmodified
    PassThrough,
    /// Mark for the proxy
    ForwardToProxy,
    /// Defer to destination classification
    #[default]
    EvaluateDestination,
}

impl SrcDefault {
    fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::PassThrough),
            "proxy" => Ok(Self::ForwardToProxy),
            "normal" => Ok(Self::EvaluateDestination),
            other => Err(TransTunnelError::Validation(format!(
                "Unknown src-default '{other}' (expected direct, proxy or normal)"
            ))
            .into()),
        }
    }
}

/// Treatment for destinations that match no destination set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DstDefault {
    /// Leave traffic unmodified
    PassThrough,
    /// Mark for the proxy
    #[default]
    ForwardToProxy,
}

impl DstDefault {
    fn parse(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::PassThrough),
            "proxy" => Ok(Self::ForwardToProxy),
            other => Err(TransTunnelError::Validation(format!(
                "Unknown dst-default '{other}' (expected direct or proxy)"
            ))
            .into()),
        }
    }
}

/// Per-category IP list files.
#[derive(Debug, Clone, Default)]
pub struct ListFiles {
    pub src_direct: Vec<PathBuf>,
    pub src_proxy: Vec<PathBuf>,
    pub src_normal: Vec<PathBuf>,
    pub dst_direct: Vec<PathBuf>,
    pub dst_proxy: Vec<PathBuf>,
}

/// Resolved, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Policy {
    pub tun_iface: String,
    pub src_default: SrcDefault,
    pub dst_default: DstDefault,
    pub self_proxy: bool,
    pub exclusion_mark: Option<u32>,
    pub extra_match: Option<String>,
    /// Interfaces whose routed traffic is classified; empty means all.
    pub ifaces: Vec<String>,
    pub servers: Vec<String>,
    pub lists: ListFiles,
}

/// Resolve CLI options into a [`Policy`] for an install run.
///
/// Flush-only mode never reaches this point. A tunnel interface and a
/// loopback guard (a server address or an exclusion mark) are hard
/// requirements here: without at least one of the two, traffic to the proxy
/// itself would be re-captured and looped back into the tunnel.
pub fn resolve(cli: &Cli) -> Result<Policy> {
    let tun_iface = cli.tun_iface.clone().ok_or_else(|| {
        TransTunnelError::Validation("A tunnel interface is required (--tun-iface)".into())
    })?;

    let servers: Vec<String> = cli.servers.iter().flat_map(|s| split_list(s)).collect();

    if servers.is_empty() && cli.mark.is_none() {
        return Err(TransTunnelError::Validation(
            "Either --server or --mark is required to keep proxy traffic out of the loop".into(),
        )
        .into());
    }
    if !servers.is_empty() && cli.mark.is_some() {
        warn!("Both --server and --mark supplied; the mark match sits later in the chain and wins");
    }

    let src_default = match cli.src_default.as_deref() {
        Some(token) => SrcDefault::parse(token)?,
        None => SrcDefault::default(),
    };
    let dst_default = match cli.dst_default.as_deref() {
        Some(token) => DstDefault::parse(token)?,
        None => DstDefault::default(),
    };

    // Ordered, deduplicated
    let mut ifaces: Vec<String> = Vec::new();
    for name in cli.ifaces.as_deref().map(split_list).unwrap_or_default() {
        if !ifaces.contains(&name) {
            ifaces.push(name);
        }
    }

    let lists = ListFiles {
        src_direct: paths(cli.src_direct.as_deref()),
        src_proxy: paths(cli.src_proxy.as_deref()),
        src_normal: paths(cli.src_normal.as_deref()),
        dst_direct: paths(cli.dst_direct.as_deref()),
        dst_proxy: paths(cli.dst_proxy.as_deref()),
    };

    Ok(Policy {
        tun_iface,
        src_default,
        dst_default,
        self_proxy: cli.self_proxy,
        exclusion_mark: cli.mark,
        extra_match: cli.extra.clone(),
        ifaces,
        servers,
        lists,
    })
}

fn paths(raw: Option<&str>) -> Vec<PathBuf> {
    raw.map(split_list)
        .unwrap_or_default()
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).unwrap()
    }

    fn assert_validation_error(result: Result<Policy>) {
        let err = result.unwrap_err();
        let class = err.downcast_ref::<TransTunnelError>().unwrap();
        assert!(matches!(class, TransTunnelError::Validation(_)));
    }

    #[test]
    fn test_resolve_minimal() {
        let cli = parse(&["transtunnel", "-i", "tun0", "-s", "203.0.113.5"]);
        let policy = resolve(&cli).unwrap();
        assert_eq!(policy.tun_iface, "tun0");
        assert_eq!(policy.src_default, SrcDefault::EvaluateDestination);
        assert_eq!(policy.dst_default, DstDefault::ForwardToProxy);
        assert!(policy.ifaces.is_empty());
    }

    #[test]
    fn test_resolve_token_table() {
        let cases = [
            ("direct", SrcDefault::PassThrough),
            ("proxy", SrcDefault::ForwardToProxy),
            ("normal", SrcDefault::EvaluateDestination),
            ("DIRECT", SrcDefault::PassThrough),
            ("Proxy", SrcDefault::ForwardToProxy),
        ];
        for (token, expected) in cases {
            let cli = parse(&[
                "transtunnel",
                "-i",
                "tun0",
                "-m",
                "100",
                "--src-default",
                token,
            ]);
            assert_eq!(resolve(&cli).unwrap().src_default, expected, "{token}");
        }

        let cli = parse(&[
            "transtunnel",
            "-i",
            "tun0",
            "-m",
            "100",
            "--dst-default",
            "Direct",
        ]);
        assert_eq!(resolve(&cli).unwrap().dst_default, DstDefault::PassThrough);
    }

    #[test]
    fn test_resolve_rejects_unknown_tokens() {
        let cli = parse(&[
            "transtunnel",
            "-i",
            "tun0",
            "-m",
            "100",
            "--src-default",
            "maybe",
        ]);
        assert_validation_error(resolve(&cli));

        // "normal" is a source-only token
        let cli = parse(&[
            "transtunnel",
            "-i",
            "tun0",
            "-m",
            "100",
            "--dst-default",
            "normal",
        ]);
        assert_validation_error(resolve(&cli));
    }

    #[test]
    fn test_resolve_requires_tun_iface() {
        let cli = parse(&["transtunnel", "-s", "203.0.113.5"]);
        assert_validation_error(resolve(&cli));
    }

    #[test]
    fn test_resolve_requires_server_or_mark() {
        let cli = parse(&["transtunnel", "-i", "tun0"]);
        assert_validation_error(resolve(&cli));

        let cli = parse(&["transtunnel", "-i", "tun0", "-m", "100"]);
        assert!(resolve(&cli).is_ok());
    }

    #[test]
    fn test_resolve_both_server_and_mark_proceeds() {
        let cli = parse(&["transtunnel", "-i", "tun0", "-s", "203.0.113.5", "-m", "100"]);
        let policy = resolve(&cli).unwrap();
        assert_eq!(policy.exclusion_mark, Some(100));
        assert_eq!(policy.servers, vec!["203.0.113.5"]);
    }

    #[test]
    fn test_resolve_splits_server_lists() {
        let cli = parse(&[
            "transtunnel",
            "-i",
            "tun0",
            "-s",
            "203.0.113.5,203.0.113.6",
            "-s",
            "proxy.example.net",
        ]);
        let policy = resolve(&cli).unwrap();
        assert_eq!(
            policy.servers,
            vec!["203.0.113.5", "203.0.113.6", "proxy.example.net"]
        );
    }

    #[test]
    fn test_resolve_ifaces_ordered_dedup() {
        let cli = parse(&[
            "transtunnel",
            "-i",
            "tun0",
            "-m",
            "100",
            "-I",
            "eth0,br-lan eth0",
        ]);
        let policy = resolve(&cli).unwrap();
        assert_eq!(policy.ifaces, vec!["eth0", "br-lan"]);
    }

    #[test]
    fn test_resolve_list_paths() {
        let cli = parse(&[
            "transtunnel",
            "-i",
            "tun0",
            "-m",
            "100",
            "--dst-proxy",
            "/a.txt /b.txt",
        ]);
        let policy = resolve(&cli).unwrap();
        assert_eq!(
            policy.lists.dst_proxy,
            vec![PathBuf::from("/a.txt"), PathBuf::from("/b.txt")]
        );
        assert!(policy.lists.src_direct.is_empty());
    }
}
