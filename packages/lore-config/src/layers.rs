use std::{env, fs, path::PathBuf};

use toml::{Table, Value};

use crate::{Error, Result};

pub const ENV_PREFIX: &str = "LORE__";

/// One source of settings. Later layers in a [`crate::resolve`] call win over earlier ones.
#[derive(Debug, Clone)]
pub enum Layer {
	/// A TOML file on disk. Missing keys fall through to lower layers.
	File(PathBuf),
	/// Inline TOML text, e.g. host-provided overrides.
	Inline { origin: String, raw: String },
	/// Selects `[profiles.<name>]` from the tables merged so far and applies it.
	Profile(String),
	/// `LORE__SECTION__KEY=value` pairs. Values parse as TOML scalars, else as plain strings.
	Env(Vec<(String, String)>),
}
impl Layer {
	pub fn from_env() -> Self {
		Self::Env(env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect())
	}
}

pub(crate) fn apply(base: &mut Table, layer: &Layer) -> Result<()> {
	match layer {
		Layer::File(path) => {
			let raw = fs::read_to_string(path)
				.map_err(|err| Error::ReadConfig { path: path.clone(), source: err })?;
			let table: Table = toml::from_str(&raw)
				.map_err(|err| Error::ParseConfig { path: path.clone(), source: err })?;

			merge(base, table);
		},
		Layer::Inline { origin, raw } => {
			let table: Table = toml::from_str(raw)
				.map_err(|err| Error::ParseLayer { origin: origin.clone(), source: err })?;

			merge(base, table);
		},
		Layer::Profile(name) => {
			let profile = base
				.get("profiles")
				.and_then(Value::as_table)
				.and_then(|profiles| profiles.get(name))
				.and_then(Value::as_table)
				.cloned()
				.ok_or_else(|| Error::Validation {
					message: format!("Config profile {name} is not defined."),
				})?;

			merge(base, profile);
		},
		Layer::Env(vars) => {
			for (key, raw) in vars {
				let Some(path) = key.strip_prefix(ENV_PREFIX) else {
					continue;
				};
				let segments =
					path.split("__").map(|segment| segment.to_ascii_lowercase()).collect::<Vec<_>>();

				if segments.iter().any(String::is_empty) {
					continue;
				}

				set_path(base, &segments, scalar(raw));
			}
		},
	}

	Ok(())
}

/// Deep merge: tables merge key by key, every other value is replaced.
pub(crate) fn merge(base: &mut Table, overlay: Table) {
	for (key, value) in overlay {
		match (base.get_mut(&key), value) {
			(Some(Value::Table(existing)), Value::Table(incoming)) => merge(existing, incoming),
			(_, value) => {
				base.insert(key, value);
			},
		}
	}
}

fn set_path(base: &mut Table, segments: &[String], value: Value) {
	let Some((last, parents)) = segments.split_last() else {
		return;
	};
	let mut cursor = base;

	for segment in parents {
		let entry = cursor.entry(segment.clone()).or_insert_with(|| Value::Table(Table::new()));

		if !entry.is_table() {
			*entry = Value::Table(Table::new());
		}

		let Value::Table(next) = entry else {
			return;
		};

		cursor = next;
	}

	cursor.insert(last.clone(), value);
}

fn scalar(raw: &str) -> Value {
	let wrapped = format!("value = {raw}");

	toml::from_str::<Table>(&wrapped)
		.ok()
		.and_then(|mut table| table.remove("value"))
		.unwrap_or_else(|| Value::String(raw.to_string()))
}
