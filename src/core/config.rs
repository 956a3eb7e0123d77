use std::{default::Default, str::FromStr};

/// How a node picks its successor when joining through a known node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinMode {
	/// Trust the known node as the immediate successor
	Direct,
	/// Ask the known node for the successor of our id
	Lookup
}

/// Pointer update rules used by notify and stabilize
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
	/// Classical Chord: only strictly closer nodes replace a pointer
	Strict,
	/// Replace the predecessor when hash(pred) <= hash(candidate),
	/// otherwise take the candidate as successor.
	/// Any predecessor of the successor other than self is adopted.
	Lenient
}

#[derive(Clone, Debug)]
pub struct Config {
	/// interval in ms between stabilization rounds (0 means disabling it)
	pub stabilize_interval: u64,
	/// deadline in ms of each remote call
	pub rpc_timeout: u64,
	/// drop the successor after this many failed rounds in a row (0 means never)
	pub successor_failure_limit: u32,
	/// max number of forwards of a single request
	pub max_hops: u32,
	pub join_mode: JoinMode,
	pub protocol: Protocol,
	/// route get/delete around the ring instead of serving them locally
	pub route_reads: bool,
	/// ping the predecessor every round and clear it when unreachable
	pub check_predecessor: bool
}

impl Default for Config {
	fn default() -> Self {
		Self {
			stabilize_interval: 1000,
			rpc_timeout: 5000,
			successor_failure_limit: 3,
			max_hops: 64,
			join_mode: JoinMode::Lookup,
			protocol: Protocol::Strict,
			route_reads: true,
			check_predecessor: true
		}
	}
}

impl FromStr for JoinMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"direct" => Ok(JoinMode::Direct),
			"lookup" => Ok(JoinMode::Lookup),
			_ => Err(format!("invalid join mode: {} (expected direct or lookup)", s))
		}
	}
}

impl FromStr for Protocol {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"strict" => Ok(Protocol::Strict),
			"lenient" => Ok(Protocol::Lenient),
			_ => Err(format!("invalid protocol: {} (expected strict or lenient)", s))
		}
	}
}
