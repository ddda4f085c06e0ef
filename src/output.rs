use std::collections::HashSet;
use std::io::{self, Write};

use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL};

use anyhow::Result;

use crate::checker::{CheckerConfig, CheckerState};

/// Example domains shown per report block
const EXAMPLES_PER_BLOCK: usize = 5;

/// Print a summary of the check configuration before running.
pub fn print_config_summary(
	domain_count: usize,
	domains_hash: &str,
	retries: u32,
	config: &CheckerConfig,
) {
	println!("DNS Blocklist Check Configuration");
	println!("=================================");
	println!("Server:         {}", config.server);
	println!("Expected A:     {}", config.expected);
	println!("Domains:        {}", domain_count);
	println!("Domain hash:    {}", domains_hash);
	println!("Concurrency:    {}", config.concurrency);
	println!("Max failures:   {}", config.max_failed);
	println!("Retries:        {}", retries);
	println!();
}

/// One non-success category as it appears in the report
struct Block<'a> {
	title: String,
	category: &'static str,
	code: Option<&'a str>,
	domains: Vec<&'a str>,
}

/// Non-success categories in report order, each with its sorted members.
fn blocks(state: &CheckerState) -> Vec<Block<'_>> {
	let mut out = vec![
		Block {
			title: "Wrong result (A record with wrong value)".to_string(),
			category: "wrong_result",
			code: None,
			domains: sorted(&state.wrong_result),
		},
		Block {
			title: "Unexpected record count (!= 1)".to_string(),
			category: "no_result",
			code: None,
			domains: sorted(&state.no_result),
		},
	];

	let mut codes: Vec<(&String, &HashSet<String>)> = state.wrong_opcode.iter().collect();
	codes.sort_by(|a, b| a.0.cmp(b.0));
	for (code, domains) in codes {
		out.push(Block {
			title: format!("Wrong reply code ({} != NOERROR)", code),
			category: "wrong_opcode",
			code: Some(code.as_str()),
			domains: sorted(domains),
		});
	}

	out.push(Block {
		title: "Failed (transport-level error)".to_string(),
		category: "failed",
		code: None,
		domains: sorted(&state.failed),
	});
	out
}

fn sorted(set: &HashSet<String>) -> Vec<&str> {
	let mut domains: Vec<&str> = set.iter().map(String::as_str).collect();
	domains.sort_unstable();
	domains
}

/// Write the human-readable report.
///
/// One block per non-empty category with a few example domains, or a single
/// all-okay line when only successes were recorded.
pub fn render_report<W: Write>(state: &CheckerState, w: &mut W) -> io::Result<()> {
	for block in blocks(state) {
		if block.domains.is_empty() {
			continue;
		}
		writeln!(w, "{}:", block.title)?;
		for domain in block.domains.iter().take(EXAMPLES_PER_BLOCK) {
			writeln!(w, " - {}", domain)?;
		}
		let left = block.domains.len().saturating_sub(EXAMPLES_PER_BLOCK);
		if left > 0 {
			writeln!(w, "(and {} more like this)", left)?;
		}
	}

	if state.all_okay() {
		writeln!(w, "All okay ({} records)!", state.okay)?;
	}
	Ok(())
}

/// Print per-category counts as a formatted table.
pub fn print_summary_table(state: &CheckerState) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Category", "Domains"]);

	table.add_row(vec!["Okay".to_string(), state.okay.to_string()]);
	for block in blocks(state) {
		table.add_row(vec![block.title, block.domains.len().to_string()]);
	}
	table.add_row(vec!["Total".to_string(), state.total().to_string()]);

	println!("\nCheck Summary");
	println!("=============\n");
	println!("{table}");
}

/// Write every non-okay domain to a CSV file.
pub fn write_csv(path: &str, state: &CheckerState) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;
	write_csv_records(&mut writer, state)?;
	writer.flush()?;
	println!("\nResults written to: {}", path);
	Ok(())
}

fn write_csv_records<W: Write>(writer: &mut csv::Writer<W>, state: &CheckerState) -> Result<()> {
	writer.write_record(["domain", "category", "detail"])?;

	for block in blocks(state) {
		let detail = block.code.unwrap_or("");
		for domain in block.domains {
			writer.write_record([domain, block.category, detail])?;
		}
	}
	Ok(())
}
