use std::sync::Arc;

use lore_config::Config;
use lore_service::{AutoTrigger, LoreService, Providers, TranscriptCache};
use lore_storage::{KnowledgeStore, file::FileStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LoreService>,
	pub transcripts: Arc<TranscriptCache>,
	pub trigger: AutoTrigger,
}
impl AppState {
	/// JSON books under `storage.books_dir`, generator from `providers.generator`.
	pub fn new(config: Config) -> Self {
		let store = Arc::new(FileStore::new(config.storage.books_dir.clone()));

		Self::with_parts(config, store, Providers::default())
	}

	pub fn with_parts(
		config: Config,
		store: Arc<dyn KnowledgeStore>,
		providers: Providers,
	) -> Self {
		let transcripts = Arc::new(TranscriptCache::new());
		let service =
			Arc::new(LoreService::with_providers(config, store, transcripts.clone(), providers));
		let trigger = AutoTrigger::new(service.clone());

		Self { service, transcripts, trigger }
	}
}
