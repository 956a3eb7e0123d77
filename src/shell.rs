use std::{net::UdpSocket, str::FromStr};
use thiserror::Error;
use crate::core::data_store::{Key, Value};

pub const DEFAULT_PORT: u16 = 3410;

pub const COMMANDS: [&str; 10] = [
	"port",
	"create",
	"join",
	"put",
	"get",
	"delete",
	"dump",
	"ping",
	"help",
	"quit"
];

pub const HELP: &str = "\
Usage:
	port <number>        set port to <number> (before create/join)
	create               start a new ring
	join <host:port>     join the ring of an existing node
	put <key> <value>    store a key/value pair on the ring
	get <key>            retrieve the value of a key
	delete <key>         remove a key from the ring
	dump                 show local data and ring pointers
	ping [host:port]     check that a node is alive (default: this node)
	help                 print this message
	quit                 close the service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	Port(u16),
	Create,
	Join(String),
	Put(Key, Value),
	Get(Key),
	Delete(Key),
	Dump,
	Ping(Option<String>),
	Help,
	Quit
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShellError {
	#[error("empty command")]
	Empty,
	#[error("unknown command: {0} (try help)")]
	Unknown(String),
	#[error("usage: {0}")]
	Usage(&'static str),
	#[error("invalid port: {0}")]
	InvalidPort(String)
}

impl FromStr for Command {
	type Err = ShellError;

	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let words: Vec<_> = line.split_whitespace().collect();
		let (name, args) = match words.split_first() {
			Some((name, args)) => (*name, args),
			None => return Err(ShellError::Empty)
		};

		let command = match (name, args) {
			("port", [n]) => {
				let port = n.parse::<u16>()
					.ok()
					.filter(|p| *p != 0)
					.ok_or_else(|| ShellError::InvalidPort(n.to_string()))?;
				Command::Port(port)
			},
			("port", _) => return Err(ShellError::Usage("port <number>")),
			("create", []) => Command::Create,
			("join", [addr]) => Command::Join(addr.to_string()),
			("join", _) => return Err(ShellError::Usage("join <host:port>")),
			("put", [k, v]) => Command::Put(k.to_string(), v.to_string()),
			("put", _) => return Err(ShellError::Usage("put <key> <value>")),
			("get", [k]) => Command::Get(k.to_string()),
			("get", _) => return Err(ShellError::Usage("get <key>")),
			("delete", [k]) => Command::Delete(k.to_string()),
			("delete", _) => return Err(ShellError::Usage("delete <key>")),
			("dump", []) => Command::Dump,
			("ping", []) => Command::Ping(None),
			("ping", [addr]) => Command::Ping(Some(addr.to_string())),
			("ping", _) => return Err(ShellError::Usage("ping [host:port]")),
			("help", _) => Command::Help,
			("quit", _) => Command::Quit,
			(name, _) if COMMANDS.contains(&name) => return Err(ShellError::Usage(HELP)),
			(name, _) => return Err(ShellError::Unknown(name.to_string()))
		};
		Ok(command)
	}
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket only selects a route, no packet is sent.
/// Falls back to the loopback address when there is no route.
pub fn local_address() -> String {
	UdpSocket::bind("0.0.0.0:0")
		.and_then(|s| {
			s.connect("8.8.8.8:80")?;
			s.local_addr()
		})
		.map(|a| a.ip().to_string())
		.unwrap_or_else(|_| "127.0.0.1".to_string())
}
