use ring_dht::core::{
	self,
	config::*,
	NodeServer,
	Node
};
use clap::Parser;

#[derive(Parser)]
struct Args {
	/// Local addr to bind (<host>:<port>)
	addr: String,

	/// Join an existing node on init (<host>:<port>)
	#[clap(short, long)]
	join: Option<String>,

	/// Interval between stabilization rounds in ms
	#[clap(long, default_value_t = 1000)]
	stabilize_interval: u64,

	/// Deadline of each remote call in ms
	#[clap(long, default_value_t = 5000)]
	rpc_timeout: u64,

	/// How to pick the successor on join (direct or lookup)
	#[clap(long, default_value = "lookup")]
	join_mode: JoinMode,

	/// Pointer update rules (strict or lenient)
	#[clap(long, default_value = "strict")]
	protocol: Protocol,

	/// Serve get/delete from the local table only
	#[clap(long)]
	local_reads: bool
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();

	let node = core::construct_node(&args.addr);
	let join_node: Option<Node> = args.join.as_deref().map(core::construct_node);

	let config = Config {
		stabilize_interval: args.stabilize_interval,
		rpc_timeout: args.rpc_timeout,
		join_mode: args.join_mode,
		protocol: args.protocol,
		route_reads: !args.local_reads,
		..Config::default()
	};
	let s = NodeServer::new(node, config);
	let manager = s.start(join_node).await?;
	manager.wait().await?;
	Ok(())
}
