pub mod host;
pub mod knowledge;
pub mod session;
pub mod summary;
pub mod timeline;
pub mod transcript;
pub mod trigger;

mod error;
mod prompts;

pub use error::{Error, Result};
pub use host::{HostCapabilities, NoopHost, NoticeLevel};
pub use knowledge::{TimelineEntry, WriteOutcome};
pub use lore_providers::ChatPrompt;
pub use session::{BookLocks, RunKind, SessionState};
pub use summary::{SummaryReport, SummaryRequest, SummaryStatus};
pub use timeline::{TimelineReport, TimelineRequest, TimelineStatus};
pub use transcript::{MessageRecord, RawMessage, RawTimestamp, Role, TranscriptCache};
pub use trigger::{AutoTrigger, Observation, PendingWork, TriggerDecision, TriggerGate};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use lore_config::{Config, GeneratorProviderConfig};
use lore_domain::{dedup::DedupEngine, writegate::RejectCode};
use lore_providers::generator;
use lore_storage::KnowledgeStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Text generation backend. The default implementation calls an OpenAI-compatible endpoint.
pub trait Generator
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GeneratorProviderConfig,
		prompt: &'a ChatPrompt,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// Host transcript access.
pub trait MessageSource
where
	Self: Send + Sync,
{
	fn messages<'a>(
		&'a self,
		conversation_id: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<RawMessage>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub generator: Arc<dyn Generator>,
}

pub struct LoreService {
	pub cfg: Config,
	pub store: Arc<dyn KnowledgeStore>,
	pub messages: Arc<dyn MessageSource>,
	pub providers: Providers,
	pub host: Arc<dyn HostCapabilities>,
	pub session: SessionState,
	books: BookLocks,
	dedup: DedupEngine,
}

struct DefaultProviders;

impl Generator for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GeneratorProviderConfig,
		prompt: &'a ChatPrompt,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(generator::generate(cfg, prompt))
	}
}

impl Providers {
	pub fn new(generator: Arc<dyn Generator>) -> Self {
		Self { generator }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { generator: Arc::new(DefaultProviders) }
	}
}

impl LoreService {
	pub fn new(
		cfg: Config,
		store: Arc<dyn KnowledgeStore>,
		messages: Arc<dyn MessageSource>,
	) -> Self {
		Self::with_providers(cfg, store, messages, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn KnowledgeStore>,
		messages: Arc<dyn MessageSource>,
		providers: Providers,
	) -> Self {
		let dedup = DedupEngine::new(&cfg.dedup);

		Self {
			cfg,
			store,
			messages,
			providers,
			host: Arc::new(NoopHost),
			session: SessionState::default(),
			books: BookLocks::default(),
			dedup,
		}
	}

	pub fn with_host(mut self, host: Arc<dyn HostCapabilities>) -> Self {
		self.host = host;

		self
	}

	pub fn dedup(&self) -> &DedupEngine {
		&self.dedup
	}

	/// Cleaned, dated records for every message of the conversation, hidden ones included.
	pub async fn read_transcript(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
		let raw = self
			.messages
			.messages(conversation_id)
			.await
			.map_err(|err| Error::Transcript { message: err.to_string() })?;

		Ok(transcript::read_transcript(&raw))
	}

	/// Marks `conversation_id` active, migrates a legacy floor marker and enables its entries.
	/// Returns how many entries were re-enabled.
	pub async fn activate_conversation(&self, book: &str, conversation_id: &str) -> usize {
		self.session.set_active(conversation_id);

		tracing::info!(conversation_id, book, "Conversation activated.");

		if let Err(err) = self.migrate_floor_marker(book, conversation_id).await {
			tracing::warn!(error = %err, book, conversation_id, "Failed to check floor marker.");
		}

		self.set_active_entries_for_conversation(book, conversation_id).await
	}

	/// Calls the generator under the configured timeout. Blank output counts as a failure.
	pub(crate) async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
		let cfg = &self.cfg.providers.generator;
		let call = self.providers.generator.generate(cfg, prompt);
		let raw = match tokio::time::timeout(Duration::from_millis(cfg.timeout_ms), call).await {
			Ok(Ok(raw)) => raw,
			Ok(Err(err)) => return Err(Error::GenerationFailed { message: err.to_string() }),
			Err(_) => return Err(Error::GenerationTimeout { timeout_ms: cfg.timeout_ms }),
		};

		if raw.trim().is_empty() {
			return Err(Error::GenerationFailed {
				message: "Generator returned blank output.".to_string(),
			});
		}

		Ok(raw)
	}
}

pub(crate) fn reject_reason_code(code: RejectCode) -> &'static str {
	match code {
		RejectCode::RejectEmpty => "REJECT_EMPTY",
		RejectCode::RejectTooLong => "REJECT_TOO_LONG",
		RejectCode::RejectMisclassified => "REJECT_MISCLASSIFIED",
	}
}
