use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use hickory_proto::rr::Name;

/// Convert one domain to its lowercase ASCII (punycode) form.
///
/// A trailing root dot is dropped; the checker adds it back when querying.
pub fn normalize_domain(input: &str) -> Result<String> {
	let trimmed = input.trim();
	let name = Name::from_utf8(trimmed)
		.map_err(|e| anyhow!("could not convert domain '{}': {}", trimmed, e))?;
	let ascii = name.to_lowercase().to_ascii();
	let ascii = ascii.trim_end_matches('.');
	if ascii.is_empty() {
		return Err(anyhow!("could not convert domain '{}': empty name", trimmed));
	}
	Ok(ascii.to_string())
}

/// Normalize, de-duplicate and sort a list of raw domain names.
pub fn normalize_domains<'a, I>(raw: I) -> Result<Vec<String>>
where
	I: IntoIterator<Item = &'a str>,
{
	let mut set = BTreeSet::new();
	for domain in raw {
		set.insert(normalize_domain(domain)?);
	}
	Ok(set.into_iter().collect())
}

/// Read domains from a file, one per line.
///
/// Blank lines and lines starting with '#' are skipped.
pub fn read_domain_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| anyhow!("failed to read domain file '{}': {}", path, e))?;
	let lines = content.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty() && !line.starts_with('#'));
	normalize_domains(lines)
}
