use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{BoxFuture, MessageSource};
use lore_domain::{
	FloorRange,
	dates::{self, Timestamp},
	text,
};

/// A message exactly as the host stores it. SillyTavern field names are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
	#[serde(default, alias = "mes")]
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default)]
	pub is_user: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, alias = "send_date", skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<RawTimestamp>,
	#[serde(default)]
	pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
	EpochMillis(i64),
	Text(String),
}
impl From<&RawTimestamp> for Timestamp {
	fn from(value: &RawTimestamp) -> Self {
		match value {
			RawTimestamp::EpochMillis(millis) => Self::EpochMillis(*millis),
			RawTimestamp::Text(text) => Self::Text(text.clone()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
	System,
}
impl Role {
	fn resolve(raw: Option<&str>, is_user: bool) -> Self {
		match raw.map(|role| role.trim().to_ascii_lowercase()).as_deref() {
			Some("user" | "human") => Self::User,
			Some("system") => Self::System,
			Some("assistant" | "char" | "character" | "model" | "bot") => Self::Assistant,
			_ if is_user => Self::User,
			_ => Self::Assistant,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
			Self::System => "system",
		}
	}
}

/// Read-only snapshot of one message. `index` is the host floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
	pub index: i64,
	pub role: Role,
	pub speaker: String,
	pub text: String,
	pub parsed_date: Option<String>,
	pub hidden: bool,
}
impl MessageRecord {
	/// `[date] speaker: text`, the shape every prompt uses.
	pub fn prompt_line(&self) -> String {
		match &self.parsed_date {
			Some(date) => format!("[{date}] {}: {}", self.speaker, self.text),
			None => format!("{}: {}", self.speaker, self.text),
		}
	}
}

/// Conversation id to raw messages, for hosts that push transcript snapshots.
#[derive(Default)]
pub struct TranscriptCache {
	conversations: Mutex<HashMap<String, Vec<RawMessage>>>,
}
impl TranscriptCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn replace(&self, conversation_id: &str, messages: Vec<RawMessage>) {
		self.lock().insert(conversation_id.to_string(), messages);
	}

	pub fn len(&self, conversation_id: &str) -> usize {
		self.lock().get(conversation_id).map(Vec::len).unwrap_or(0)
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<RawMessage>>> {
		self.conversations.lock().unwrap_or_else(|err| err.into_inner())
	}
}

impl MessageSource for TranscriptCache {
	fn messages<'a>(
		&'a self,
		conversation_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<RawMessage>>> {
		Box::pin(async move { Ok(self.lock().get(conversation_id).cloned().unwrap_or_default()) })
	}
}

pub fn read_transcript(messages: &[RawMessage]) -> Vec<MessageRecord> {
	messages.iter().enumerate().map(|(idx, raw)| to_record(idx as i64, raw)).collect()
}

/// Visible records with `range.start <= index <= range.end`.
pub fn select(records: &[MessageRecord], range: FloorRange) -> Vec<MessageRecord> {
	records
		.iter()
		.filter(|record| !record.hidden && range.contains(record.index))
		.cloned()
		.collect()
}

pub fn date_span(records: &[MessageRecord]) -> Option<String> {
	dates::date_span(records.iter().filter_map(|record| record.parsed_date.as_deref()))
}

fn to_record(index: i64, raw: &RawMessage) -> MessageRecord {
	let role = Role::resolve(raw.role.as_deref(), raw.is_user);
	let speaker = raw
		.name
		.as_deref()
		.map(str::trim)
		.filter(|name| !name.is_empty())
		.unwrap_or(role.as_str())
		.to_string();
	let text = text::clean_message(&raw.text);
	let parsed_date = dates::extract_date(&text)
		.or_else(|| raw.timestamp.as_ref().and_then(|ts| dates::timestamp_date(&ts.into())));

	MessageRecord { index, role, speaker, text, parsed_date, hidden: raw.hidden }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn raw(text: &str) -> RawMessage {
		RawMessage { text: text.to_string(), ..RawMessage::default() }
	}

	#[test]
	fn roles_and_speakers_resolve_with_fallbacks() {
		let messages = vec![
			RawMessage { role: Some("Model".to_string()), ..raw("hi") },
			RawMessage { is_user: true, name: Some("  Alice ".to_string()), ..raw("hello") },
			RawMessage { role: Some("system".to_string()), name: Some(" ".to_string()), ..raw("x") },
		];
		let records = read_transcript(&messages);

		assert_eq!(records[0].role, Role::Assistant);
		assert_eq!(records[0].speaker, "assistant");
		assert_eq!(records[1].role, Role::User);
		assert_eq!(records[1].speaker, "Alice");
		assert_eq!(records[2].speaker, "system");
		assert_eq!(records[2].index, 2);
	}

	#[test]
	fn text_dates_win_over_timestamps() {
		let messages = vec![
			RawMessage {
				timestamp: Some(RawTimestamp::Text("2024-05-01T10:00:00Z".to_string())),
				..raw("<p>到了2024年6月3日</p>")
			},
			RawMessage { timestamp: Some(RawTimestamp::EpochMillis(0)), ..raw("nothing dated") },
		];
		let records = read_transcript(&messages);

		assert_eq!(records[0].text, "到了2024年6月3日");
		assert_eq!(records[0].parsed_date.as_deref(), Some("2024-06-03"));
		assert_eq!(records[1].parsed_date.as_deref(), Some("1970-01-01"));
	}

	#[test]
	fn select_skips_hidden_messages_but_keeps_indices() {
		let messages = vec![raw("a"), RawMessage { hidden: true, ..raw("b") }, raw("c"), raw("d")];
		let records = read_transcript(&messages);
		let picked = select(&records, FloorRange::new(1, 2));

		assert_eq!(picked.len(), 1);
		assert_eq!(picked[0].index, 2);
		assert_eq!(picked[0].prompt_line(), "assistant: c");
	}

	#[test]
	fn host_json_aliases_are_accepted() {
		let message: RawMessage = serde_json::from_value(serde_json::json!({
			"mes": "今天下雨",
			"is_user": true,
			"name": "Bob",
			"send_date": 1714557600000_i64
		}))
		.expect("message parses");

		assert_eq!(message.text, "今天下雨");
		assert_eq!(message.timestamp, Some(RawTimestamp::EpochMillis(1_714_557_600_000)));
	}
}
