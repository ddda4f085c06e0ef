use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::dns::{build_query, classify, Outcome};
use crate::transport::{DnsExchange, TransportError};

/// Callback invoked with (completed, total) after every classified outcome
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Per-run checker configuration
#[derive(Clone)]
pub struct CheckerConfig {
	/// DNS server under test
	pub server: SocketAddr,
	/// Address every domain is expected to resolve to
	pub expected: Ipv4Addr,
	/// Maximum number of queries in flight at once
	pub concurrency: usize,
	/// A pass aborts once more than this many domains have failed
	pub max_failed: usize,
	/// Log every transport failure as it is classified
	pub log_failures: bool,
	pub progress: Option<ProgressFn>,
}

impl CheckerConfig {
	pub fn new(server: SocketAddr, expected: Ipv4Addr) -> Self {
		Self {
			server,
			expected,
			concurrency: 32,
			max_failed: 1000,
			log_failures: false,
			progress: None,
		}
	}
}

impl fmt::Debug for CheckerConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CheckerConfig")
			.field("server", &self.server)
			.field("expected", &self.expected)
			.field("concurrency", &self.concurrency)
			.field("max_failed", &self.max_failed)
			.field("log_failures", &self.log_failures)
			.field("progress", &self.progress.is_some())
			.finish()
	}
}

/// Accumulated classification of every domain checked so far.
///
/// Each checked domain lives in exactly one category. Only `failed` ever
/// shrinks, when a retry pass takes its members out for re-classification.
#[derive(Debug, Default, Clone)]
pub struct CheckerState {
	pub okay: usize,
	pub wrong_result: HashSet<String>,
	pub no_result: HashSet<String>,
	pub wrong_opcode: HashMap<String, HashSet<String>>,
	pub failed: HashSet<String>,
}

impl CheckerState {
	/// Sort one outcome into its category.
	pub fn record(&mut self, domain: String, outcome: &Outcome) {
		match outcome {
			Outcome::Success => self.okay += 1,
			Outcome::WrongResult => {
				self.wrong_result.insert(domain);
			}
			Outcome::NoResult => {
				self.no_result.insert(domain);
			}
			Outcome::WrongOpcode(code) => {
				self.wrong_opcode.entry(code.clone()).or_default().insert(domain);
			}
			Outcome::TransportFailure(_) => {
				self.failed.insert(domain);
			}
		}
	}

	pub fn wrong_opcode_count(&self) -> usize {
		self.wrong_opcode.values().map(HashSet::len).sum()
	}

	/// Number of domains across every category, successes included
	pub fn total(&self) -> usize {
		self.okay
			+ self.wrong_result.len()
			+ self.no_result.len()
			+ self.wrong_opcode_count()
			+ self.failed.len()
	}

	/// True when nothing but successes has been recorded
	pub fn all_okay(&self) -> bool {
		self.wrong_result.is_empty()
			&& self.no_result.is_empty()
			&& self.wrong_opcode.values().all(HashSet::is_empty)
			&& self.failed.is_empty()
	}
}

/// Errors that end a check pass early
#[derive(Debug, Error)]
pub enum CheckError {
	#[error("too many failures ({failed} > {threshold})")]
	TooManyFailures { failed: usize, threshold: usize },
	#[error("check cancelled")]
	Cancelled,
}

/// Checks that a DNS server resolves domains to one expected A record.
pub struct Checker {
	config: CheckerConfig,
	exchange: Arc<dyn DnsExchange>,
	shutdown: Option<watch::Receiver<bool>>,
	state: CheckerState,
}

impl Checker {
	pub fn new(config: CheckerConfig, exchange: Arc<dyn DnsExchange>) -> Self {
		Self {
			config,
			exchange,
			shutdown: None,
			state: CheckerState::default(),
		}
	}

	/// Abort any running pass with `CheckError::Cancelled` once `true` is sent.
	pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
		self.shutdown = Some(shutdown);
		self
	}

	pub fn state(&self) -> &CheckerState {
		&self.state
	}

	/// Run one check pass over `domains`.
	///
	/// Outcomes are classified as they arrive, in completion order. On error
	/// the outcomes classified so far stay in the state; the pass's remaining
	/// workers are aborted and their results never counted.
	pub async fn check(&mut self, domains: &[String]) -> Result<(), CheckError> {
		self.pass(domains, &mut HashSet::new()).await
	}

	/// One check pass that also notes every domain it classified.
	async fn pass(&mut self, domains: &[String], classified: &mut HashSet<String>) -> Result<(), CheckError> {
		if domains.is_empty() {
			return Ok(());
		}

		let total = domains.len();
		// Room for every result so workers never wait on a slow aggregator
		let (tx, mut rx) = mpsc::channel(total);
		let mut workers = dispatch(
			domains,
			self.config.concurrency,
			self.config.expected,
			self.exchange.clone(),
			tx,
		);

		let Self { config, shutdown, state, .. } = self;
		let mut done = 0;
		loop {
			let received = tokio::select! {
				received = rx.recv() => received,
				_ = shutdown_requested(shutdown.as_mut()) => {
					workers.abort_all();
					return Err(CheckError::Cancelled);
				}
			};
			let Some((domain, outcome)) = received else {
				break;
			};

			done += 1;
			if let Outcome::TransportFailure(e) = &outcome {
				if config.log_failures {
					warn!("{} failed: {}", domain, e);
				}
			}
			classified.insert(domain.clone());
			state.record(domain, &outcome);
			if let Some(progress) = &config.progress {
				progress(done, total);
			}

			if state.failed.len() > config.max_failed {
				workers.abort_all();
				return Err(CheckError::TooManyFailures {
					failed: state.failed.len(),
					threshold: config.max_failed,
				});
			}
		}

		while let Some(joined) = workers.join_next().await {
			if let Err(e) = joined {
				warn!("query task failed: {}", e);
			}
		}
		Ok(())
	}

	/// Re-check every currently failed domain.
	///
	/// The failed set is emptied before dispatch, so each domain is classified
	/// afresh and only lands back in `failed` if it fails again. If the pass
	/// ends early, domains it never classified are returned to `failed`.
	pub async fn retry_failed(&mut self) -> Result<(), CheckError> {
		let mut domains: Vec<String> = std::mem::take(&mut self.state.failed)
			.into_iter()
			.collect();
		domains.sort();

		let mut classified = HashSet::new();
		let result = self.pass(&domains, &mut classified).await;
		if result.is_err() {
			for domain in domains {
				if !classified.contains(&domain) {
					self.state.failed.insert(domain);
				}
			}
		}
		result
	}

	/// Retry failures until none remain or `retries` attempts were made.
	///
	/// An aborted attempt ends the loop with that error.
	pub async fn retry_until_settled(&mut self, retries: u32) -> Result<(), CheckError> {
		for _ in 0..retries {
			if self.state.failed.is_empty() {
				break;
			}
			info!("Retrying {} failures...", self.state.failed.len());
			self.retry_failed().await?;
		}
		Ok(())
	}

	/// A full check pass followed by up to `retries` retry passes.
	pub async fn check_with_retries(&mut self, domains: &[String], retries: u32) -> Result<(), CheckError> {
		self.check(domains).await?;
		self.retry_until_settled(retries).await
	}
}

/// Spawn one worker per domain, bounded by a shared pool of `limit` permits.
///
/// Every worker holds a sender clone, so the channel closes exactly when the
/// last worker has delivered its outcome.
fn dispatch(
	domains: &[String],
	limit: usize,
	expected: Ipv4Addr,
	exchange: Arc<dyn DnsExchange>,
	tx: mpsc::Sender<(String, Outcome)>,
) -> JoinSet<()> {
	let permits = Arc::new(Semaphore::new(limit.max(1)));
	let mut workers = JoinSet::new();

	for domain in domains {
		let permits = permits.clone();
		let exchange = exchange.clone();
		let tx = tx.clone();
		let domain = domain.clone();

		workers.spawn(async move {
			let Ok(_permit) = permits.acquire_owned().await else {
				return;
			};
			let outcome = match build_query(&domain) {
				Ok(query) => classify(exchange.exchange(&query).await, expected),
				Err(e) => Outcome::TransportFailure(TransportError::Proto(e)),
			};
			// Receiver gone means the pass already ended
			let _ = tx.send((domain, outcome)).await;
		});
	}

	workers
}

/// Resolves once the shutdown flag is raised; never resolves without a receiver.
async fn shutdown_requested(shutdown: Option<&mut watch::Receiver<bool>>) {
	let Some(rx) = shutdown else {
		return std::future::pending().await;
	};
	loop {
		if *rx.borrow_and_update() {
			return;
		}
		if rx.changed().await.is_err() {
			// Sender dropped without ever signalling
			return std::future::pending().await;
		}
	}
}
