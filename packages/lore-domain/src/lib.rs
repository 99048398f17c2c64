pub mod cjk;
pub mod dates;
pub mod dedup;
pub mod fragments;
pub mod glossary;
pub mod tags;
pub mod text;
pub mod tokens;
pub mod writegate;

use serde::{Deserialize, Serialize};

/// Sentinel floor meaning "nothing summarized yet".
pub const NO_FLOOR: i64 = -1;

/// One extracted fact, destined to become one world-info entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFragment {
	pub label: String,
	pub content: String,
	#[serde(default)]
	pub keywords: Vec<String>,
}

/// Inclusive range of message indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorRange {
	pub start: i64,
	pub end: i64,
}
impl FloorRange {
	pub fn new(start: i64, end: i64) -> Self {
		Self { start, end }
	}

	pub fn is_empty(&self) -> bool {
		self.start > self.end || self.end < 0
	}

	pub fn contains(&self, floor: i64) -> bool {
		self.start <= floor && floor <= self.end
	}

	pub fn len(&self) -> usize {
		if self.is_empty() { 0 } else { (self.end - self.start.max(0) + 1) as usize }
	}
}
impl std::fmt::Display for FloorRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}-{}", self.start, self.end)
	}
}
