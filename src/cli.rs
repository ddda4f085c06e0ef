use std::net::Ipv4Addr;

use clap::Parser;

use crate::registry::DEFAULT_REGISTRY_URL;

/// DNS blocklist checker
#[derive(Parser, Debug)]
#[command(name = "blockcheck")]
#[command(about = "Check that a DNS server redirects every blocklisted domain to one address")]
pub struct Cli {
	/// Address of DNS server to check (e.g. 1.1.1.1, 1.1.1.1:53, dns.example)
	#[arg(short = 's', long = "server")]
	pub server: String,

	/// A record every blocklisted domain should resolve to
	#[arg(short = 'e', long = "expect", default_value = "145.237.235.240")]
	pub expect: Ipv4Addr,

	/// Maximum concurrent in-flight queries
	#[arg(short = 'j', long = "concurrency", default_value = "16",
		value_parser = clap::value_parser!(u32).range(1..))]
	pub concurrency: u32,

	/// Abort a pass once more than this many domains failed to resolve
	#[arg(long = "max-failed", default_value = "1000")]
	pub max_failed: usize,

	/// How many times to retry transport failures
	#[arg(long = "retries", default_value = "3")]
	pub retries: u32,

	/// Query timeout in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "2000")]
	pub timeout: u64,

	/// Do not log each transport failure
	#[arg(long = "quiet-failures")]
	pub quiet_failures: bool,

	/// Log progress every N checked domains
	#[arg(long = "progress-every", default_value = "400")]
	pub progress_every: usize,

	/// Address of the registry endpoint
	#[arg(long = "registry", default_value = DEFAULT_REGISTRY_URL)]
	pub registry: String,

	/// Read domains from a file (one per line) instead of the registry
	#[arg(short = 'f', long = "domain-file")]
	pub domain_file: Option<String>,

	/// Output CSV file path for every domain that was not okay
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Default log filter, overridden by RUST_LOG
	#[arg(long = "log-level", default_value = "info")]
	pub log_level: String,
}
