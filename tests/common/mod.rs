use ring_dht::{
	core::{
		ring::{
			Digest,
			DIGEST_BYTES,
			in_range_incl
		},
		Config,
		Node,
		NodeServer,
		calculate_hash
	},
	server::ServerManager
};
use rand::{Rng, distributions::Alphanumeric};

pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

// Node placed at i/4 of the ring
pub fn quarter_node(port: u16, i: u8) -> Node {
	let mut bytes = [0u8; DIGEST_BYTES];
	bytes[0] = i * 64;
	Node {
		addr: format!("localhost:{}", port),
		id: Digest::new(bytes)
	}
}

// Generate key whose digest is in range (start, end]
pub fn generate_key_in_range<T: Rng>(rng: &mut T, start: Digest, end: Digest) -> String {
	loop {
		let key: String = (0..8)
			.map(|_| char::from(rng.sample(Alphanumeric)))
			.collect();
		if in_range_incl(calculate_hash(key.as_bytes()), start, end) {
			return key;
		}
	}
}

/// Start the nodes in order, each joining through the first one,
/// and stabilize every node twice after each join
pub async fn build_ring(nodes: &[Node], config: &Config) -> anyhow::Result<(Vec<NodeServer>, Vec<ServerManager>)> {
	let mut servers: Vec<NodeServer> = Vec::new();
	let mut managers = Vec::new();
	for (i, n) in nodes.iter().enumerate() {
		let s = NodeServer::new(n.clone(), config.clone());
		let join_node = if i == 0 { None } else { Some(nodes[0].clone()) };
		managers.push(s.start(join_node).await?);
		servers.push(s);

		for _ in 0..2 {
			for s in servers.iter() {
				s.stabilize().await?;
			}
		}
	}
	Ok((servers, managers))
}
