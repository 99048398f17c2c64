pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use color_eyre::eyre;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use lore_config::Layer;

#[derive(Debug, Parser)]
#[command(
	version = lore_cli::VERSION,
	rename_all = "kebab",
	styles = lore_cli::styles(),
)]
pub struct Args {
	/// TOML config file. Built-in defaults apply when omitted.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: Option<PathBuf>,
	/// Named table under `[profiles]` applied on top of the file.
	#[arg(long, short = 'p', value_name = "NAME")]
	pub profile: Option<String>,
}
impl Args {
	/// Defaults < file < profile < `LORE__*` environment.
	pub fn layers(&self) -> Vec<Layer> {
		let mut layers = Vec::new();

		if let Some(path) = &self.config {
			layers.push(Layer::File(path.clone()));
		}
		if let Some(profile) = &self.profile {
			layers.push(Layer::Profile(profile.clone()));
		}

		layers.push(Layer::from_env());

		layers
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lore_config::resolve(&args.layers())?;

	init_tracing(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;

	if config.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}

	tracing::info!(
		books_dir = %config.storage.books_dir.display(),
		model = %config.providers.generator.model,
		"Configuration resolved."
	);

	let state = AppState::new(config);
	let app = routes::router(state);
	let listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(listener, app).await?;

	Ok(())
}

fn init_tracing(config: &lore_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_and_profile_layers_precede_the_environment() {
		let args = Args::try_parse_from(["lore-api", "-c", "lore.toml", "--profile", "quiet"])
			.expect("Failed to parse args.");
		let layers = args.layers();

		assert_eq!(layers.len(), 3);
		assert!(matches!(&layers[0], Layer::File(path) if path == &PathBuf::from("lore.toml")));
		assert!(matches!(&layers[1], Layer::Profile(name) if name == "quiet"));
		assert!(matches!(&layers[2], Layer::Env(_)));
	}

	#[test]
	fn config_file_is_optional() {
		let args = Args::try_parse_from(["lore-api"]).expect("Failed to parse args.");

		assert_eq!(args.layers().len(), 1);
	}
}
