use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
	pub service: Service,
	pub security: Security,
	pub storage: Storage,
	pub providers: Providers,
	pub summary: Summary,
	pub dedup: Dedup,
	pub timeline: Timeline,
	pub trigger: Trigger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { http_bind: "127.0.0.1:8787".to_string(), log_level: "info".to_string() }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	/// Optional. When set, every `/v1` route requires `Authorization: Bearer <token>`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_auth_token: Option<String>,
}
impl Default for Security {
	fn default() -> Self {
		Self { bind_localhost_only: true, api_auth_token: None }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
	/// Directory holding one `<book>.json` file per world book.
	pub books_dir: PathBuf,
	/// Book used when a request does not name one.
	pub default_book: String,
}
impl Default for Storage {
	fn default() -> Self {
		Self { books_dir: PathBuf::from("books"), default_book: "lore".to_string() }
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Providers {
	pub generator: GeneratorProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}
impl Default for GeneratorProviderConfig {
	fn default() -> Self {
		Self {
			provider_id: "openai".to_string(),
			api_base: "https://api.openai.com/v1".to_string(),
			api_key: String::new(),
			path: "/chat/completions".to_string(),
			model: "gpt-4o-mini".to_string(),
			temperature: 0.3,
			timeout_ms: 80_000,
			default_headers: Map::new(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
	/// Upper bound for the existing-knowledge context handed to the generator.
	pub context_max_chars: u32,
	pub max_fragments_per_run: u32,
	pub max_label_chars: u32,
	pub max_fragment_chars: u32,
	/// Fragment entries take the smallest unused order at or above this value.
	pub order_floor: i32,
	pub position: String,
	pub max_output_tokens: u32,
	/// Labels or contents containing any of these phrases are treated as misclassified
	/// summaries and never written as fragments.
	pub blocklist: Vec<String>,
	pub persona: String,
}
impl Default for Summary {
	fn default() -> Self {
		Self {
			context_max_chars: 4_000,
			max_fragments_per_run: 12,
			max_label_chars: 10,
			max_fragment_chars: 400,
			order_floor: 100,
			position: "before_character".to_string(),
			max_output_tokens: 1_200,
			blocklist: vec![
				"世界线总结".to_string(),
				"大总结".to_string(),
				"时间线".to_string(),
				"总结进度".to_string(),
				"楼层总结".to_string(),
				"world line summary".to_string(),
				"[timeline]".to_string(),
			],
			persona: "You are the archivist of a long-running roleplay. You record durable facts \
				about the characters and their world."
				.to_string(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dedup {
	pub similarity_threshold: f32,
	pub containment_threshold: f32,
	/// Extra bilingual glossary rows used by the cross-lingual comparison.
	#[serde(default)]
	pub equivalents: Vec<Equivalent>,
}
impl Default for Dedup {
	fn default() -> Self {
		Self { similarity_threshold: 0.80, containment_threshold: 0.70, equivalents: Vec::new() }
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Equivalent {
	#[serde(default)]
	pub zh: Vec<String>,
	#[serde(default)]
	pub en: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
	pub token_budget: u32,
	pub merge_token_budget: u32,
	pub min_effective_chars: u32,
	pub segment_batch_messages: u32,
	pub order: i32,
	pub position: String,
	pub max_output_tokens: u32,
}
impl Default for Timeline {
	fn default() -> Self {
		Self {
			token_budget: 2_000,
			merge_token_budget: 1_200,
			min_effective_chars: 20,
			segment_batch_messages: 40,
			order: 50,
			position: "before_character".to_string(),
			max_output_tokens: 800,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
	pub enabled: bool,
	pub message_threshold: u32,
	pub token_threshold: u32,
	pub debounce_ms: u64,
	pub min_interval_ms: u64,
}
impl Default for Trigger {
	fn default() -> Self {
		Self {
			enabled: true,
			message_threshold: 20,
			token_threshold: 6_000,
			debounce_ms: 3_000,
			min_interval_ms: 5_000,
		}
	}
}
