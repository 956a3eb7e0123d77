use crate::core::{
	ring::Digest,
	Node,
	ServiceError,
	data_store::{Key, Value}
};

#[tarpc::service]
pub trait NodeService {
	// Liveness check, replies "pong!"
	async fn ping_rpc() -> String;

	// Get fields at this node
	async fn get_node_rpc() -> Node;
	async fn get_predecessor_rpc() -> Option<Node>;
	async fn get_successor_rpc() -> Option<Node>;

	// Ring maintenance
	async fn find_successor_rpc(id: Digest, hops: u32) -> Result<Node, ServiceError>;
	async fn notify_rpc(node: Node);

	// Get key locally
	async fn get_local_rpc(key: Key) -> Option<Value>;

	// Get or set key on the ring
	async fn put_rpc(key: Key, value: Value, hops: u32) -> Result<(), ServiceError>;
	async fn get_rpc(key: Key, hops: u32) -> Result<Option<Value>, ServiceError>;
	async fn delete_rpc(key: Key, hops: u32) -> Result<(), ServiceError>;
}
