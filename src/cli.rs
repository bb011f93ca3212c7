//! CLI argument parsing with clap.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "transtunnel")]
#[command(author, version, about = "Transparent proxy packet marking for Linux gateways")]
pub struct Cli {
    /// Tunnel interface that marked traffic is routed into
    #[arg(short = 'i', long, value_name = "NAME")]
    pub tun_iface: Option<String>,

    /// Files listing sources that always bypass the proxy (comma/space separated)
    #[arg(long, value_name = "FILES")]
    pub src_direct: Option<String>,

    /// Files listing sources that always go through the proxy
    #[arg(long, value_name = "FILES")]
    pub src_proxy: Option<String>,

    /// Files listing sources classified by their destination
    #[arg(long, value_name = "FILES")]
    pub src_normal: Option<String>,

    /// Files listing destinations that always bypass the proxy
    #[arg(long, value_name = "FILES")]
    pub dst_direct: Option<String>,

    /// Files listing destinations that always go through the proxy
    #[arg(long, value_name = "FILES")]
    pub dst_proxy: Option<String>,

    /// Default treatment for unlisted sources: direct, proxy or normal
    #[arg(long, value_name = "ACTION")]
    pub src_default: Option<String>,

    /// Default treatment for unlisted destinations: direct or proxy
    #[arg(long, value_name = "ACTION")]
    pub dst_default: Option<String>,

    /// Also classify traffic originated by this host
    #[arg(short = 'o', long)]
    pub self_proxy: bool,

    /// Remote proxy server address(es); repeatable, accepts comma/space lists
    #[arg(short = 's', long = "server", value_name = "ADDRS")]
    pub servers: Vec<String>,

    /// Interfaces whose routed traffic is classified (default: all)
    #[arg(short = 'I', long, value_name = "LIST")]
    pub ifaces: Option<String>,

    /// Extra match expression appended verbatim to generated rules
    #[arg(short = 'e', long, value_name = "EXPR", allow_hyphen_values = true)]
    pub extra: Option<String>,

    /// Firewall mark carried by the proxy client's own outbound traffic
    #[arg(short = 'm', long, value_name = "MARK")]
    pub mark: Option<u32>,

    /// Debug output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Remove everything transtunnel installed, then exit
    #[arg(short = 'f', long)]
    pub flush: bool,
}

/// Split a comma- or space-separated argument into its tokens.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_minimal_install() {
        let cli = Cli::try_parse_from(["transtunnel", "-i", "tun0", "-s", "203.0.113.5"]).unwrap();
        assert_eq!(cli.tun_iface.as_deref(), Some("tun0"));
        assert_eq!(cli.servers, vec!["203.0.113.5"]);
        assert!(!cli.flush);
        assert!(!cli.self_proxy);
    }

    #[test]
    fn test_cli_flush_only() {
        let cli = Cli::try_parse_from(["transtunnel", "--flush"]).unwrap();
        assert!(cli.flush);
        assert!(cli.tun_iface.is_none());
    }

    #[test]
    fn test_cli_repeatable_servers() {
        let cli = Cli::try_parse_from([
            "transtunnel",
            "-i",
            "tun0",
            "-s",
            "203.0.113.5",
            "-s",
            "203.0.113.6",
        ])
        .unwrap();
        assert_eq!(cli.servers.len(), 2);
    }

    #[test]
    fn test_cli_defaults_and_mark() {
        let cli = Cli::try_parse_from([
            "transtunnel",
            "-i",
            "tun0",
            "--src-default",
            "proxy",
            "--dst-default",
            "direct",
            "-m",
            "100",
            "-o",
        ])
        .unwrap();
        assert_eq!(cli.src_default.as_deref(), Some("proxy"));
        assert_eq!(cli.dst_default.as_deref(), Some("direct"));
        assert_eq!(cli.mark, Some(100));
        assert!(cli.self_proxy);
    }

    #[test]
    fn test_cli_non_numeric_mark_rejected() {
        assert!(Cli::try_parse_from(["transtunnel", "-i", "tun0", "-m", "abc"]).is_err());
    }

    #[test]
    fn test_cli_list_files_and_extra() {
        let cli = Cli::try_parse_from([
            "transtunnel",
            "-i",
            "tun0",
            "-s",
            "203.0.113.5",
            "--src-direct",
            "/etc/transtunnel/lan.txt,/etc/transtunnel/printers.txt",
            "-e",
            "-p tcp",
        ])
        .unwrap();
        assert!(cli.src_direct.as_deref().unwrap().contains("printers"));
        assert_eq!(cli.extra.as_deref(), Some("-p tcp"));
    }

    #[test]
    fn test_split_list_commas_and_spaces() {
        assert_eq!(split_list("a,b c"), vec!["a", "b", "c"]);
        assert_eq!(split_list("  a ,, b  "), vec!["a", "b"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" , ").is_empty());
    }
}
