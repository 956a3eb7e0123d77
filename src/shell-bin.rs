use ring_dht::{
	core::{
		self,
		config::*,
		NodeServer
	},
	server::ServerManager,
	shell::{self, Command, COMMANDS, HELP}
};
use clap::Parser;
use inquire::{Text, CustomUserError};
use anyhow::anyhow;

#[derive(Parser)]
struct Args {
	/// Host this node is reachable at (discovered when omitted)
	#[clap(long)]
	host: Option<String>,

	/// Port to listen on
	#[clap(short, long, default_value_t = shell::DEFAULT_PORT)]
	port: u16,

	/// Interval between stabilization rounds in ms
	#[clap(long, default_value_t = 1000)]
	stabilize_interval: u64,

	/// How to pick the successor on join (direct or lookup)
	#[clap(long, default_value = "lookup")]
	join_mode: JoinMode,

	/// Pointer update rules (strict or lenient)
	#[clap(long, default_value = "strict")]
	protocol: Protocol
}

fn suggest_command(v: &str) -> Result<Vec<String>, CustomUserError> {
	let mut result = Vec::new();
	for command in COMMANDS {
		if v.len() > 0 && command.starts_with(v) {
			result.push(command.to_string());
		}
	}
	Ok(result)
}

fn complete_command(v: &str) -> Result<Option<String>, CustomUserError> {
	let result = suggest_command(v)?;
	let command = if result.len() > 0 {
		Some(result[0].clone() + " ")
	}
	else {
		None
	};
	Ok(command)
}

struct Shell {
	host: String,
	port: u16,
	config: Config,
	// Some once create or join succeeded
	running: Option<(NodeServer, ServerManager)>
}

impl Shell {
	fn addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	fn server(&self) -> anyhow::Result<&NodeServer> {
		match self.running.as_ref() {
			Some((s, _)) => Ok(s),
			None => Err(anyhow!("node is not listening, run create or join first"))
		}
	}

	async fn start(&mut self, join: Option<String>) -> anyhow::Result<()> {
		if self.running.is_some() {
			return Err(anyhow!("node is already listening at {}", self.addr()));
		}
		let server = NodeServer::new(core::construct_node(&self.addr()), self.config.clone());
		let manager = server.start(join.as_deref().map(core::construct_node)).await?;
		println!("Listening at {} as {}", self.addr(), server.node().id);
		self.running = Some((server, manager));
		Ok(())
	}

	/// Returns false when the shell should exit
	async fn execute(&mut self, command: Command) -> anyhow::Result<bool> {
		match command {
			Command::Port(port) => {
				if self.running.is_some() {
					return Err(anyhow!("port: cannot change port while listening"));
				}
				self.port = port;
				println!("Port has been set to {}", port);
			},
			Command::Create => {
				println!("Creating a new ring");
				self.start(None).await?;
			},
			Command::Join(addr) => {
				println!("Joining the ring of {}", addr);
				self.start(Some(addr)).await?;
			},
			Command::Put(key, value) => {
				self.server()?.put(key, value, 0).await?;
			},
			Command::Get(key) => {
				match self.server()?.get(key, 0).await? {
					Some(v) => println!("{}", v),
					None => return Err(anyhow!("get: key doesn't exist"))
				};
			},
			Command::Delete(key) => {
				self.server()?.delete(key, 0).await?;
			},
			Command::Dump => {
				println!("{}", self.server()?.dump());
			},
			Command::Ping(addr) => {
				let server = self.server()?;
				let addr = addr.unwrap_or_else(|| server.node().addr.clone());
				println!("{}", server.ping(&addr).await?);
			},
			Command::Help => println!("{}", HELP),
			Command::Quit => {
				if let Some((_, manager)) = self.running.take() {
					if let Err(e) = manager.stop().await {
						println!("Error: {}", e);
					}
				}
				println!("Quitting!");
				return Ok(false);
			}
		};
		Ok(true)
	}
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();

	let mut shell = Shell {
		host: args.host.unwrap_or_else(shell::local_address),
		port: args.port,
		config: Config {
			stabilize_interval: args.stabilize_interval,
			join_mode: args.join_mode,
			protocol: args.protocol,
			..Config::default()
		},
		running: None
	};

	loop {
		let line = match Text::new("")
			.with_suggester(&suggest_command)
			.with_completer(&complete_command)
			.prompt() {
			Ok(line) => line,
			// ctrl-c or ctrl-d
			Err(_) => "quit".to_string()
		};

		let command = match line.parse::<Command>() {
			Ok(c) => c,
			Err(shell::ShellError::Empty) => continue,
			Err(e) => {
				println!("Error: {}", e);
				continue;
			}
		};
		match shell.execute(command).await {
			Ok(true) => (),
			Ok(false) => break,
			Err(e) => println!("Error: {}", e)
		};
	}
	Ok(())
}
