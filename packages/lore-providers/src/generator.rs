use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lore_config::GeneratorProviderConfig;

/// One generation call: system instructions, user payload, output cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
	pub system: String,
	pub user: String,
	pub max_tokens: u32,
}

pub async fn generate(cfg: &GeneratorProviderConfig, prompt: &ChatPrompt) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": prompt.max_tokens,
		"messages": [
			{ "role": "system", "content": prompt.system },
			{ "role": "user", "content": prompt.user },
		],
	});

	for attempt in 1..=2 {
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		match parse_completion(&json) {
			Ok(text) => return Ok(text),
			Err(err) => tracing::warn!(attempt, error = %err, "Generator returned no usable text."),
		}
	}

	Err(eyre::eyre!("Generator response has no message content."))
}

fn parse_completion(json: &Value) -> Result<String> {
	let choice = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.ok_or_else(|| eyre::eyre!("Generator response has no choices."))?;
	let content = choice
		.get("message")
		.and_then(|msg| msg.get("content"))
		.or_else(|| choice.get("text"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| eyre::eyre!("Generator choice has no text content."))?;

	if content.trim().is_empty() {
		return Err(eyre::eyre!("Generator content is blank."));
	}

	Ok(content.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_chat_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "role": "assistant", "content": "[标题] 猫\n[内容] 黑猫" } }
			]
		});

		assert_eq!(parse_completion(&json).expect("parse failed"), "[标题] 猫\n[内容] 黑猫");
	}

	#[test]
	fn accepts_legacy_text_choices() {
		let json = serde_json::json!({ "choices": [{ "text": "无" }] });

		assert_eq!(parse_completion(&json).expect("parse failed"), "无");
	}

	#[test]
	fn blank_content_is_an_error() {
		let json = serde_json::json!({ "choices": [{ "message": { "content": "  " } }] });

		assert!(parse_completion(&json).is_err());
		assert!(parse_completion(&serde_json::json!({})).is_err());
	}
}
