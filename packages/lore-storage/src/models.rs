use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the host injects an entry relative to the character card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Position {
	#[default]
	BeforeCharacter,
	AfterCharacter,
	TopOfNotes,
	BottomOfNotes,
	AtDepth,
	BeforeExamples,
	AfterExamples,
	Other(u8),
}
impl Position {
	pub fn from_name(name: &str) -> Option<Self> {
		let position = match name {
			"before_character" => Self::BeforeCharacter,
			"after_character" => Self::AfterCharacter,
			"top_of_notes" => Self::TopOfNotes,
			"bottom_of_notes" => Self::BottomOfNotes,
			"at_depth" => Self::AtDepth,
			"before_examples" => Self::BeforeExamples,
			"after_examples" => Self::AfterExamples,
			_ => return None,
		};

		Some(position)
	}
}
impl From<u8> for Position {
	fn from(value: u8) -> Self {
		match value {
			0 => Self::BeforeCharacter,
			1 => Self::AfterCharacter,
			2 => Self::TopOfNotes,
			3 => Self::BottomOfNotes,
			4 => Self::AtDepth,
			5 => Self::BeforeExamples,
			6 => Self::AfterExamples,
			other => Self::Other(other),
		}
	}
}
impl From<Position> for u8 {
	fn from(value: Position) -> Self {
		match value {
			Position::BeforeCharacter => 0,
			Position::AfterCharacter => 1,
			Position::TopOfNotes => 2,
			Position::BottomOfNotes => 3,
			Position::AtDepth => 4,
			Position::BeforeExamples => 5,
			Position::AfterExamples => 6,
			Position::Other(other) => other,
		}
	}
}

/// One world-info entry in the host's JSON layout. Fields the host adds that are not modelled
/// here survive a load/save cycle through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldEntry {
	pub uid: u32,
	#[serde(default)]
	pub key: Vec<String>,
	#[serde(default)]
	pub comment: String,
	#[serde(default)]
	pub content: String,
	#[serde(default)]
	pub constant: bool,
	#[serde(default)]
	pub order: i32,
	#[serde(default)]
	pub position: Position,
	#[serde(default)]
	pub disable: bool,
	/// Conversation that produced the entry. `None` for user-authored entries.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub owner_conversation: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl WorldEntry {
	pub fn is_owned_by(&self, conversation_id: &str) -> bool {
		self.owner_conversation.as_deref() == Some(conversation_id)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldBook {
	#[serde(default)]
	pub entries: BTreeMap<u32, WorldEntry>,
}
impl WorldBook {
	pub fn next_uid(&self) -> u32 {
		self.entries.keys().next_back().map(|uid| uid.saturating_add(1)).unwrap_or(0)
	}

	/// Inserts `entry` under a fresh uid and returns that uid.
	pub fn insert(&mut self, mut entry: WorldEntry) -> u32 {
		let uid = self.next_uid();

		entry.uid = uid;

		self.entries.insert(uid, entry);

		uid
	}

	pub fn owned_by<'a>(
		&'a self,
		conversation_id: &'a str,
	) -> impl Iterator<Item = &'a WorldEntry> + 'a {
		self.entries.values().filter(move |entry| entry.is_owned_by(conversation_id))
	}

	pub fn find_mut<F>(&mut self, mut predicate: F) -> Option<&mut WorldEntry>
	where
		F: FnMut(&WorldEntry) -> bool,
	{
		self.entries.values_mut().find(|entry| predicate(entry))
	}

	/// Smallest order at or above `floor` not yet taken by an entry at `position`.
	pub fn free_order(&self, position: Position, floor: i32) -> i32 {
		let taken = self
			.entries
			.values()
			.filter(|entry| entry.position == position)
			.map(|entry| entry.order)
			.collect::<BTreeSet<_>>();
		let mut order = floor;

		while taken.contains(&order) {
			order = order.saturating_add(1);

			if order == i32::MAX {
				break;
			}
		}

		order
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn host_json_round_trips_unknown_fields() {
		let raw = serde_json::json!({
			"entries": {
				"3": {
					"uid": 3,
					"key": ["热可可"],
					"comment": "[记忆碎片] 喜欢-热可可",
					"content": "{{user}}喜欢热可可",
					"constant": false,
					"order": 100,
					"position": 0,
					"disable": false,
					"ownerConversation": "chat-1",
					"probability": 100,
					"depth": 4
				}
			}
		});
		let book: WorldBook = serde_json::from_value(raw.clone()).expect("book parses");

		assert_eq!(book.entries[&3].owner_conversation.as_deref(), Some("chat-1"));
		assert_eq!(book.entries[&3].extra["depth"], 4);
		assert_eq!(serde_json::to_value(&book).expect("book renders"), raw);
	}

	#[test]
	fn free_order_skips_taken_slots_per_position() {
		let mut book = WorldBook::default();

		for order in [100, 101, 103] {
			book.insert(WorldEntry { order, ..WorldEntry::default() });
		}

		book.insert(WorldEntry {
			order: 102,
			position: Position::AfterCharacter,
			..WorldEntry::default()
		});

		assert_eq!(book.free_order(Position::BeforeCharacter, 100), 102);
		assert_eq!(book.free_order(Position::AfterCharacter, 100), 100);
	}

	#[test]
	fn unknown_positions_are_preserved() {
		let entry: WorldEntry =
			serde_json::from_value(serde_json::json!({ "uid": 1, "position": 9 }))
				.expect("entry parses");

		assert_eq!(entry.position, Position::Other(9));
		assert_eq!(serde_json::to_value(entry.position).expect("position renders"), 9);
	}

	#[test]
	fn uids_grow_from_the_highest_existing() {
		let mut book = WorldBook::default();

		book.entries.insert(7, WorldEntry { uid: 7, ..WorldEntry::default() });

		assert_eq!(book.insert(WorldEntry::default()), 8);
	}
}
