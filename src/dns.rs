use std::net::Ipv4Addr;

use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::ProtoError;

use crate::transport::TransportError;

/// How the server answered a single domain
#[derive(Debug)]
pub enum Outcome {
	/// Exactly one A record, equal to the expected address
	Success,
	/// Exactly one answer, but not the expected A record
	WrongResult,
	/// Reply code was success but the answer count was not 1
	NoResult,
	/// Reply code other than NOERROR, carried as its mnemonic (e.g. "NXDOMAIN")
	WrongOpcode(String),
	/// No reply was received at all
	TransportFailure(TransportError),
}

/// Build a recursive A query for `domain` anchored at the root label.
///
/// Each query carries a fresh random transaction ID.
pub fn build_query(domain: &str) -> Result<Message, ProtoError> {
	let name = Name::from_ascii(format!("{}.", domain))?;

	let mut message = Message::new();
	message.set_id(rand::random());
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, RecordType::A));
	Ok(message)
}

/// Classify a reply that made it back from the server.
///
/// Order matters: the reply code is inspected before the answer section, and
/// the answer section before the record value.
pub fn classify_response(reply: &Message, expected: Ipv4Addr) -> Outcome {
	let rcode = reply.response_code();
	if rcode != ResponseCode::NoError {
		return Outcome::WrongOpcode(rcode_name(rcode));
	}

	let answers = reply.answers();
	if answers.len() != 1 {
		return Outcome::NoResult;
	}

	match answers[0].data() {
		RData::A(a) if a.0 == expected => Outcome::Success,
		_ => Outcome::WrongResult,
	}
}

/// Map an exchange result onto the outcome taxonomy.
pub fn classify(result: Result<Message, TransportError>, expected: Ipv4Addr) -> Outcome {
	match result {
		Ok(reply) => classify_response(&reply, expected),
		Err(e) => Outcome::TransportFailure(e),
	}
}

/// Conventional mnemonic for a reply code, as used in zone tooling.
pub fn rcode_name(rcode: ResponseCode) -> String {
	let name = match rcode {
		ResponseCode::NoError => "NOERROR",
		ResponseCode::FormErr => "FORMERR",
		ResponseCode::ServFail => "SERVFAIL",
		ResponseCode::NXDomain => "NXDOMAIN",
		ResponseCode::NotImp => "NOTIMP",
		ResponseCode::Refused => "REFUSED",
		ResponseCode::YXDomain => "YXDOMAIN",
		ResponseCode::YXRRSet => "YXRRSET",
		ResponseCode::NXRRSet => "NXRRSET",
		ResponseCode::NotAuth => "NOTAUTH",
		ResponseCode::NotZone => "NOTZONE",
		ResponseCode::BADVERS => "BADVERS",
		other => return format!("RCODE{}", u16::from(other)),
	};
	name.to_string()
}
