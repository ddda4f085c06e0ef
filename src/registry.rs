use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::domains::normalize_domains;

/// Version prefix of the domain list fingerprint
const HASH_PREFIX: &str = "rsh-hash-v0";

/// Public endpoint of the gambling domain register
pub const DEFAULT_REGISTRY_URL: &str = "https://hazard.mf.gov.pl/api/Register";

/// Decoded `<Rejestr>` document
#[derive(Debug, Deserialize)]
pub struct Registry {
	#[serde(rename = "PozycjaRejestru", default)]
	pub entries: Vec<RegistryEntry>,
}

/// One `<PozycjaRejestru>`; fields other than the address are ignored
#[derive(Debug, Deserialize)]
pub struct RegistryEntry {
	#[serde(rename = "AdresDomeny")]
	pub address: String,
}

impl Registry {
	/// Parse the registry XML, rejecting a document without entries.
	pub fn from_xml(body: &str) -> Result<Self> {
		let registry: Registry = quick_xml::de::from_str(body)
			.map_err(|e| anyhow!("while parsing registry: {}", e))?;
		if registry.entries.is_empty() {
			return Err(anyhow!("zero results in registry"));
		}
		Ok(registry)
	}

	/// Normalized, de-duplicated and sorted domain names.
	pub fn domains(&self) -> Result<Vec<String>> {
		normalize_domains(self.entries.iter().map(|e| e.address.as_str()))
	}

	/// Fingerprint of the normalized domain list, identifying a registry snapshot.
	pub fn hash(&self) -> Result<String> {
		Ok(domains_hash(&self.domains()?))
	}
}

/// SHA-256 over the version prefix followed by `:"<domain>"` for each domain.
///
/// `domains` must already be normalized and sorted.
pub fn domains_hash(domains: &[String]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(HASH_PREFIX.as_bytes());
	for domain in domains {
		hasher.update(format!(":{:?}", domain).as_bytes());
	}
	hex::encode(hasher.finalize())
}

/// Download and decode the registry.
pub async fn fetch(url: &str, timeout: Duration) -> Result<Registry> {
	info!("Downloading registry from {}...", url);
	let client = reqwest::Client::builder()
		.timeout(timeout)
		.build()
		.map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;

	let response = client.get(url).send().await
		.map_err(|e| anyhow!("while connecting to registry: {}", e))?
		.error_for_status()
		.map_err(|e| anyhow!("registry returned an error: {}", e))?;
	let body = response.text().await
		.map_err(|e| anyhow!("while downloading registry: {}", e))?;
	debug!("Registry document is {} bytes", body.len());

	let registry = Registry::from_xml(&body)?;
	info!("Registry has {} entries (hash {})", registry.entries.len(), registry.hash()?);
	Ok(registry)
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Rejestr xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <PozycjaRejestru Lp="1">
    <AdresDomeny>casino.example</AdresDomeny>
    <DataWpisu>2017-07-01T00:00:00</DataWpisu>
  </PozycjaRejestru>
  <PozycjaRejestru Lp="2">
    <AdresDomeny>Bets.Example</AdresDomeny>
    <DataWpisu>2017-07-02T00:00:00</DataWpisu>
  </PozycjaRejestru>
  <PozycjaRejestru Lp="3">
    <AdresDomeny>casino.example</AdresDomeny>
  </PozycjaRejestru>
</Rejestr>"#;

	#[test]
	fn test_parse_registry() {
		let registry = Registry::from_xml(SAMPLE).unwrap();
		assert_eq!(registry.entries.len(), 3);
		assert_eq!(registry.entries[0].address, "casino.example");
	}

	#[test]
	fn test_registry_domains_normalized() {
		let registry = Registry::from_xml(SAMPLE).unwrap();
		let domains = registry.domains().unwrap();
		assert_eq!(domains, vec!["bets.example", "casino.example"]);
	}

	#[test]
	fn test_registry_hash_pinned() {
		let registry = Registry::from_xml(SAMPLE).unwrap();
		assert_eq!(
			registry.hash().unwrap(),
			"04861101cd001e023e86fcf332b28763b12b37be552a326af7487b0b7c8e49ad",
		);
	}

	#[test]
	fn test_hash_ignores_duplicates_and_case() {
		let registry = Registry::from_xml(SAMPLE).unwrap();
		let domains = vec!["bets.example".to_string(), "casino.example".to_string()];
		assert_eq!(registry.hash().unwrap(), domains_hash(&domains));
		assert_ne!(domains_hash(&domains), domains_hash(&domains[..1]));
	}

	#[test]
	fn test_empty_registry_rejected() {
		let err = Registry::from_xml("<Rejestr></Rejestr>").unwrap_err();
		assert!(err.to_string().contains("zero results"));
	}

	#[test]
	fn test_malformed_registry_rejected() {
		let err = Registry::from_xml("<Rejestr><PozycjaRejestru>").unwrap_err();
		assert!(err.to_string().contains("while parsing registry"));
	}
}
