use std::fmt;
use serde::{Serialize, Deserialize};

pub const DIGEST_BYTES: usize = 20;
// number of bits
pub const NUM_BITS: usize = DIGEST_BYTES * 8;

/// A point on the identifier ring.
///
/// Stored big-endian, so the derived ordering of the byte array
/// is the numeric ordering of the 160-bit integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_BYTES]);

impl Digest {
	pub const ZERO: Digest = Digest([0; DIGEST_BYTES]);
	pub const MAX: Digest = Digest([u8::MAX; DIGEST_BYTES]);

	pub const fn new(bytes: [u8; DIGEST_BYTES]) -> Self {
		Digest(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; DIGEST_BYTES] {
		&self.0
	}
}

// Places the value in the low-order bytes
impl From<u64> for Digest {
	fn from(v: u64) -> Self {
		let mut bytes = [0u8; DIGEST_BYTES];
		bytes[DIGEST_BYTES - 8..].copy_from_slice(&v.to_be_bytes());
		Digest(bytes)
	}
}

impl fmt::Display for Digest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", hex::encode(self.as_bytes()))
	}
}

impl fmt::Debug for Digest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Digest({})", self)
	}
}

// Strictly in range: id in (start, end)
pub fn in_range(id: Digest, start: Digest, end: Digest) -> bool {
	if end > start {
		// (start, id, end)
		id > start && id < end
	}
	else {
		// end <= start
		// case 1: (start, id, end + MAX_VAL)
		// case 2: (start, id + MAX_VAL, end + MAX_VAL)
		id > start || id < end
	}
}

// Half-open range: id in (start, end]
pub fn in_range_incl(id: Digest, start: Digest, end: Digest) -> bool {
	id == end || in_range(id, start, end)
}
