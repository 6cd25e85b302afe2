use std::path::PathBuf;

use clap::Parser;

use crate::select::Strategy;
use crate::session::TlsMode;

/// Command line options
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Anonymous Active Directory account enumeration over LDAP ping")]
pub struct Cli {
    /// Comma separated list of directory servers, IP or full hostname.
    /// Auto-detection is attempted if not supplied
    #[arg(long, value_delimiter = ',')]
    pub server: Vec<String>,

    /// Domain to probe, in DNS suffix format. Auto-detected if not supplied
    #[arg(long = "dnsdomain")]
    pub dns_domain: Option<String>,

    /// LDAP port to connect to (389 or 636 typical)
    #[arg(long, default_value_t = 389)]
    pub port: u16,

    /// Transport mode
    #[arg(long = "tlsmode", value_enum, default_value_t = TlsMode::NoTls)]
    pub tls_mode: TlsMode,

    /// Skip certificate validation in TLS mode
    #[arg(long = "ignorecert")]
    pub ignore_cert: bool,

    /// File to read candidate names from; stdin if not supplied
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// File to write confirmed names to; stdout if not supplied
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Only do a request every N ms across the whole pool, 0 to disable
    #[arg(long, default_value_t = 0)]
    pub throttle: u64,

    /// Disconnect and reconnect a session after N requests, 0 to disable
    #[arg(long = "maxrequests", default_value_t = 0)]
    pub max_requests: u64,

    /// Maximum number of servers to run in parallel
    #[arg(long = "maxservers", default_value_t = 8)]
    pub max_servers: usize,

    /// How to select servers if more are discovered than wanted
    #[arg(long = "maxstrategy", value_enum, default_value_t = Strategy::Fastest)]
    pub max_strategy: Strategy,

    /// Sessions per server
    #[arg(long, default_value_t = 8)]
    pub parallel: usize,

    /// Dump the root DSE attributes of the first server and exit
    #[arg(long)]
    pub dump: bool,

    /// Generate candidate names of this length instead of reading them
    #[arg(long)]
    pub generate: Option<usize>,

    /// Charset for generated names
    #[arg(long, default_value = "abcdefghijklmnopqrstuvwxyz0123456789")]
    pub charset: String,

    /// Log level
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}
