use std::net::{IpAddr, SocketAddr};

use anyhow::{anyhow, Result};

const DEFAULT_PORT: u16 = 53;

/// Parse a literal server address.
///
/// Supports formats:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
///
/// Returns None when the input is not an IP literal (e.g. a host name).
pub fn parse_server_addr(input: &str) -> Option<SocketAddr> {
	let trimmed = input.trim();
	if trimmed.starts_with('[') {
		trimmed.parse().ok()
	} else if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		Some(addr)
	} else {
		trimmed.parse::<IpAddr>().ok()
			.map(|ip| SocketAddr::new(ip, DEFAULT_PORT))
	}
}

/// Split "host" or "host:port" into its parts, defaulting to port 53.
fn split_host_port(input: &str) -> Result<(&str, u16)> {
	match input.rsplit_once(':') {
		Some((host, port)) => {
			let port = port.parse()
				.map_err(|e| anyhow!("invalid port in server address '{}': {}", input, e))?;
			Ok((host, port))
		}
		None => Ok((input, DEFAULT_PORT)),
	}
}

/// Resolve the DNS server to check into a socket address.
///
/// IP literals are used as given; host names are looked up once here.
pub async fn resolve_server(input: &str) -> Result<SocketAddr> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("empty server address"));
	}
	if let Some(addr) = parse_server_addr(trimmed) {
		return Ok(addr);
	}
	if trimmed.starts_with('[') {
		return Err(anyhow!("invalid bracketed IPv6 address '{}'", trimmed));
	}

	let (host, port) = split_host_port(trimmed)?;
	if host.is_empty() {
		return Err(anyhow!("missing host in server address '{}'", trimmed));
	}
	let mut addrs = tokio::net::lookup_host((host, port)).await
		.map_err(|e| anyhow!("failed to resolve server '{}': {}", host, e))?;
	addrs.next()
		.ok_or_else(|| anyhow!("server '{}' resolved to no addresses", host))
}
