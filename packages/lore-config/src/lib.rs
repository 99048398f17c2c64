mod error;
mod layers;
mod types;

pub use error::{Error, Result};
pub use layers::{ENV_PREFIX, Layer};
pub use types::{
	Config, Dedup, Equivalent, GeneratorProviderConfig, Providers, Security, Service, Storage,
	Summary, Timeline, Trigger,
};

use std::path::Path;

use toml::{Table, Value};

/// Insertion positions understood by the world-info host.
pub const POSITIONS: [&str; 7] = [
	"before_character",
	"after_character",
	"top_of_notes",
	"bottom_of_notes",
	"at_depth",
	"before_examples",
	"after_examples",
];

pub fn load(path: &Path) -> Result<Config> {
	resolve(&[Layer::File(path.to_path_buf())])
}

/// Merges built-in defaults with `layers` in order, then normalizes and validates the result.
pub fn resolve(layers: &[Layer]) -> Result<Config> {
	let defaults =
		Value::try_from(Config::default()).map_err(|err| Error::RenderDefaults { source: err })?;
	let mut merged = match defaults {
		Value::Table(table) => table,
		_ => Table::new(),
	};

	for layer in layers {
		layers::apply(&mut merged, layer)?;
	}

	merged.remove("profiles");

	let mut cfg: Config =
		Value::Table(merged).try_into().map_err(|err| Error::Shape { source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.books_dir.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.books_dir must be non-empty.".to_string(),
		});
	}
	if !is_book_name(&cfg.storage.default_book) {
		return Err(Error::Validation {
			message: "storage.default_book must be a plain file stem.".to_string(),
		});
	}

	let generator = &cfg.providers.generator;

	if generator.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.generator.api_base must be non-empty.".to_string(),
		});
	}
	if generator.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.generator.model must be non-empty.".to_string(),
		});
	}
	if generator.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.generator.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !generator.temperature.is_finite() || generator.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.generator.temperature must be a finite number of zero or greater."
				.to_string(),
		});
	}

	for (label, value) in [
		("summary.context_max_chars", cfg.summary.context_max_chars),
		("summary.max_fragments_per_run", cfg.summary.max_fragments_per_run),
		("summary.max_label_chars", cfg.summary.max_label_chars),
		("summary.max_fragment_chars", cfg.summary.max_fragment_chars),
		("summary.max_output_tokens", cfg.summary.max_output_tokens),
		("timeline.token_budget", cfg.timeline.token_budget),
		("timeline.merge_token_budget", cfg.timeline.merge_token_budget),
		("timeline.segment_batch_messages", cfg.timeline.segment_batch_messages),
		("timeline.max_output_tokens", cfg.timeline.max_output_tokens),
		("trigger.message_threshold", cfg.trigger.message_threshold),
		("trigger.token_threshold", cfg.trigger.token_threshold),
	] {
		if value == 0 {
			return Err(Error::Validation { message: format!("{label} must be greater than zero.") });
		}
	}

	for (label, value) in [
		("summary.position", &cfg.summary.position),
		("timeline.position", &cfg.timeline.position),
	] {
		if !POSITIONS.contains(&value.as_str()) {
			return Err(Error::Validation {
				message: format!("{label} must be one of {}.", POSITIONS.join(", ")),
			});
		}
	}

	for (label, value) in [
		("dedup.similarity_threshold", cfg.dedup.similarity_threshold),
		("dedup.containment_threshold", cfg.dedup.containment_threshold),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if !(0.0..=1.0).contains(&value) || value == 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be in the range (0.0, 1.0]."),
			});
		}
	}

	for equivalent in &cfg.dedup.equivalents {
		if equivalent.zh.is_empty() || equivalent.en.is_empty() {
			return Err(Error::Validation {
				message: "dedup.equivalents rows must list at least one zh and one en term."
					.to_string(),
			});
		}
	}

	if cfg.trigger.debounce_ms == 0 {
		return Err(Error::Validation {
			message: "trigger.debounce_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}

	cfg.providers.generator.api_base =
		cfg.providers.generator.api_base.trim().trim_end_matches('/').to_string();
	cfg.summary.blocklist = cfg
		.summary
		.blocklist
		.iter()
		.map(|phrase| phrase.trim().to_lowercase())
		.filter(|phrase| !phrase.is_empty())
		.collect();

	for equivalent in &mut cfg.dedup.equivalents {
		equivalent.zh.retain(|term| !term.trim().is_empty());
		equivalent.en = equivalent
			.en
			.iter()
			.map(|term| term.trim().to_lowercase())
			.filter(|term| !term.is_empty())
			.collect();
	}
}

fn is_book_name(name: &str) -> bool {
	let trimmed = name.trim();

	!trimmed.is_empty()
		&& trimmed == name
		&& !name.contains(['/', '\\'])
		&& name != "."
		&& name != ".."
}
