//! # transtunnel - transparent proxy packet marking for Linux gateways
//!
//! transtunnel turns IP address lists and policy defaults into a
//! deterministic packet-marking configuration: traffic crossing (or leaving)
//! a routing host is classified by source and destination address into
//! DIRECT or PROXY treatment, and PROXY-bound packets receive a firewall
//! mark that a policy-routing rule sends into a tunnel interface.
//!
//! ## Architecture
//!
//! The pipeline is one straight line, each stage a pure function of the
//! previous one:
//!
//! ```text
//! CLI flags ──── policy::resolve ──► Policy
//! list files ─── sets::build ──────► AddressSets      (→ ipset)
//! Policy ─────── chain::compile ───► DecisionChain    (→ iptables mangle)
//! all three ──── lifecycle::install / flush           (→ ip rule / route)
//! ```
//!
//! Everything installed lives under two reserved prefixes (`TRANSTUNNEL_`
//! chains, `transtunnel_` sets). `flush` removes exactly that and nothing
//! else via save → filter → restore, and `install` always starts with a
//! flush, so a re-run never leaks or collides with a previous one.
//!
//! The decision chain is an immutable value: tests compare and simulate it
//! directly ([`chain::DecisionChain::classify`]) instead of inspecting live
//! kernel state.
//!
//! ## Modules
//!
//! - [`chain`] - decision chain compilation and simulation
//! - [`cli`] - command-line interface definitions
//! - [`enforcer`] - backend drivers (ipset, iptables, ip) and environment checks
//! - [`error`] - error taxonomy and exit codes
//! - [`exec`] - process execution seam (mockable)
//! - [`lifecycle`] - install/flush orchestration
//! - [`lock`] - single-instance flock guard
//! - [`policy`] - policy token resolution
//! - [`sets`] - address set construction

pub mod chain;
pub mod cli;
pub mod enforcer;
pub mod error;
pub mod exec;
pub mod lifecycle;
pub mod lock;
pub mod policy;
pub mod sets;

pub use cli::Cli;
pub use error::TransTunnelError;
