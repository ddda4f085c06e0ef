mod checker;
mod cli;
mod dns;
mod domains;
mod output;
mod registry;
mod resolver;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::checker::{Checker, CheckerConfig};
use crate::cli::Cli;
use crate::transport::UdpExchange;

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();

	let server = resolver::resolve_server(&cli.server).await?;
	info!("Checking server {} ({} concurrent connections)...", server, cli.concurrency);

	// Collect domains from a local file or the registry
	let domains = match &cli.domain_file {
		Some(path) => domains::read_domain_file(path)?,
		None => {
			let registry = registry::fetch(&cli.registry, Duration::from_secs(60)).await
				.map_err(|e| anyhow!("Retrieving domains failed: {}", e))?;
			registry.domains()
				.map_err(|e| anyhow!("Parsing domains failed: {}", e))?
		}
	};

	let progress_every = cli.progress_every.max(1);
	let config = CheckerConfig {
		server,
		expected: cli.expect,
		concurrency: cli.concurrency as usize,
		max_failed: cli.max_failed,
		log_failures: !cli.quiet_failures,
		progress: Some(Arc::new(move |done: usize, total: usize| {
			if done % progress_every == 0 {
				info!("{:.2}% done...", done as f64 * 100.0 / total as f64);
			}
		})),
	};

	let domains_hash = registry::domains_hash(&domains);
	output::print_config_summary(domains.len(), &domains_hash, cli.retries, &config);

	// Ctrl-C stops the running pass; whatever was classified is still reported
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			let _ = shutdown_tx.send(true);
		}
	});

	let exchange = Arc::new(UdpExchange::new(config.server, Duration::from_millis(cli.timeout)));
	let mut checker = Checker::new(config, exchange).with_shutdown(shutdown_rx);

	if let Err(e) = checker.check_with_retries(&domains, cli.retries).await {
		error!("Check failed: {}", e);
		output::render_report(checker.state(), &mut std::io::stdout().lock())?;
		output::print_summary_table(checker.state());
		return Err(anyhow!("Check failed: {}", e));
	}

	output::render_report(checker.state(), &mut std::io::stdout().lock())?;
	output::print_summary_table(checker.state());

	if let Some(path) = &cli.output {
		output::write_csv(path, checker.state())?;
	}

	Ok(())
}
