use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType};
use hickory_proto::ProtoError;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Errors that prevent a reply from being received at all
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("timed out after {0:?}")]
	Timeout(Duration),
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	#[error("malformed DNS message: {0}")]
	Proto(#[from] ProtoError),
	#[error("{0}")]
	Unexpected(String),
}

/// Sends one DNS query and waits for its reply.
///
/// Implementations never retry; a query that cannot be answered is reported
/// as a `TransportError` and left for the caller to classify.
#[async_trait]
pub trait DnsExchange: Send + Sync {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError>;
}

/// Plain DNS over UDP against a single server.
///
/// Every exchange binds a dedicated socket so that concurrent queries never
/// read each other's replies.
#[derive(Debug, Clone)]
pub struct UdpExchange {
	server: SocketAddr,
	timeout: Duration,
}

impl UdpExchange {
	pub fn new(server: SocketAddr, timeout: Duration) -> Self {
		Self { server, timeout }
	}
}

#[async_trait]
impl DnsExchange for UdpExchange {
	async fn exchange(&self, query: &Message) -> Result<Message, TransportError> {
		let query_bytes = query.to_vec()?;

		let bind_addr = if self.server.is_ipv4() {
			"0.0.0.0:0"
		} else {
			"[::]:0"
		};
		let socket = UdpSocket::bind(bind_addr).await?;
		socket.send_to(&query_bytes, self.server).await?;

		// Keep reading until a reply matching our txid arrives or time runs out.
		// Stray datagrams and garbage are skipped rather than failing the query.
		let deadline = Instant::now() + self.timeout;
		let mut buf = vec![0u8; 4096];
		let mut last_error = None;
		loop {
			let now = Instant::now();
			if now >= deadline {
				break;
			}
			let (len, src) = match tokio::time::timeout(deadline - now, socket.recv_from(&mut buf)).await {
				Ok(received) => received?,
				Err(_) => break,
			};
			if src != self.server {
				continue;
			}
			match Message::from_vec(&buf[..len]) {
				Ok(reply) if reply.id() != query.id() => {
					last_error = Some(TransportError::Unexpected(format!(
						"txid mismatch: expected {}, got {}",
						query.id(), reply.id(),
					)));
				}
				Ok(reply) if reply.message_type() != MessageType::Response => {
					last_error = Some(TransportError::Unexpected(
						"received a query instead of a response".to_string(),
					));
				}
				Ok(reply) => return Ok(reply),
				Err(e) => last_error = Some(TransportError::Proto(e)),
			}
		}

		Err(last_error.unwrap_or(TransportError::Timeout(self.timeout)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hickory_proto::op::ResponseCode;

	use crate::dns::build_query;

	/// Bind a loopback responder that answers the first datagram with `respond`.
	async fn spawn_responder<F>(respond: F) -> SocketAddr
	where
		F: FnOnce(Message) -> Vec<Vec<u8>> + Send + 'static,
	{
		let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let addr = socket.local_addr().unwrap();
		tokio::spawn(async move {
			let mut buf = vec![0u8; 4096];
			let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
			let query = Message::from_vec(&buf[..len]).unwrap();
			for datagram in respond(query) {
				socket.send_to(&datagram, peer).await.unwrap();
			}
		});
		addr
	}

	fn reply_to(query: &Message, rcode: ResponseCode) -> Message {
		let mut reply = query.clone();
		reply.set_message_type(MessageType::Response);
		reply.set_response_code(rcode);
		reply
	}

	#[tokio::test]
	async fn test_exchange_returns_reply() {
		let server = spawn_responder(|query| {
			vec![reply_to(&query, ResponseCode::NXDomain).to_vec().unwrap()]
		}).await;
		let exchange = UdpExchange::new(server, Duration::from_secs(2));

		let query = build_query("example.com").unwrap();
		let reply = exchange.exchange(&query).await.unwrap();
		assert_eq!(reply.id(), query.id());
		assert_eq!(reply.response_code(), ResponseCode::NXDomain);
	}

	#[tokio::test]
	async fn test_exchange_skips_mismatched_txid() {
		let server = spawn_responder(|query| {
			let mut stray = reply_to(&query, ResponseCode::ServFail);
			stray.set_id(query.id().wrapping_add(1));
			vec![
				stray.to_vec().unwrap(),
				reply_to(&query, ResponseCode::NoError).to_vec().unwrap(),
			]
		}).await;
		let exchange = UdpExchange::new(server, Duration::from_secs(2));

		let query = build_query("example.com").unwrap();
		let reply = exchange.exchange(&query).await.unwrap();
		assert_eq!(reply.response_code(), ResponseCode::NoError);
	}

	#[tokio::test]
	async fn test_exchange_times_out() {
		// Bound but silent
		let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let server = silent.local_addr().unwrap();
		let exchange = UdpExchange::new(server, Duration::from_millis(50));

		let query = build_query("example.com").unwrap();
		let err = exchange.exchange(&query).await.unwrap_err();
		assert!(matches!(err, TransportError::Timeout(_)), "got {:?}", err);
	}

	#[tokio::test]
	async fn test_exchange_reports_only_mismatches() {
		let server = spawn_responder(|query| {
			let mut stray = reply_to(&query, ResponseCode::NoError);
			stray.set_id(query.id().wrapping_add(7));
			vec![stray.to_vec().unwrap()]
		}).await;
		let exchange = UdpExchange::new(server, Duration::from_millis(200));

		let query = build_query("example.com").unwrap();
		let err = exchange.exchange(&query).await.unwrap_err();
		assert!(err.to_string().contains("txid mismatch"));
	}
}
