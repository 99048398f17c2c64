//! Doubles and fixtures shared by the workspace's integration tests.

mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	env, fs,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use uuid::Uuid;

use lore_config::{Config, GeneratorProviderConfig};
use lore_service::{
	BoxFuture, ChatPrompt, Generator, HostCapabilities, LoreService, NoticeLevel, Providers,
	RawMessage, TranscriptCache,
};
use lore_storage::{KnowledgeStore, memory::MemoryStore, models::WorldBook};

pub const BOOK: &str = "lore";
pub const CONVERSATION: &str = "chat-1";

#[derive(Debug, Clone)]
enum Step {
	Reply(String),
	Fail(String),
	Delay(Duration, String),
}

/// Generator that plays back a queue of canned replies and records every prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
	steps: Mutex<VecDeque<Step>>,
	fallback: Option<String>,
	prompts: Mutex<Vec<ChatPrompt>>,
	calls: AtomicUsize,
}
impl ScriptedGenerator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Answers `reply` whenever the queue is empty.
	pub fn repeating(reply: &str) -> Self {
		Self { fallback: Some(reply.to_string()), ..Self::default() }
	}

	pub fn reply(self, text: &str) -> Self {
		self.push(Step::Reply(text.to_string()))
	}

	pub fn fail(self, message: &str) -> Self {
		self.push(Step::Fail(message.to_string()))
	}

	/// Replies with `text` after `delay`. Pair with paused tokio time.
	pub fn delayed(self, delay: Duration, text: &str) -> Self {
		self.push(Step::Delay(delay, text.to_string()))
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn prompts(&self) -> Vec<ChatPrompt> {
		lock(&self.prompts).clone()
	}

	fn push(self, step: Step) -> Self {
		lock(&self.steps).push_back(step);

		self
	}
}

impl Generator for ScriptedGenerator {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GeneratorProviderConfig,
		prompt: &'a ChatPrompt,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			lock(&self.prompts).push(prompt.clone());

			let step = lock(&self.steps).pop_front();

			match step {
				Some(Step::Reply(text)) => Ok(text),
				Some(Step::Fail(message)) => Err(eyre::eyre!(message)),
				Some(Step::Delay(delay, text)) => {
					tokio::time::sleep(delay).await;

					Ok(text)
				},
				None => self
					.fallback
					.clone()
					.ok_or_else(|| eyre::eyre!("No scripted reply left.")),
			}
		})
	}
}

/// Memory store whose loads or saves can be switched to fail or slowed down.
#[derive(Default)]
pub struct FlakyStore {
	inner: MemoryStore,
	latency: Option<Duration>,
	fail_loads: AtomicBool,
	fail_saves: AtomicBool,
	saves: AtomicUsize,
}
impl FlakyStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_book(book: &str, world: WorldBook) -> Self {
		Self { inner: MemoryStore::with_book(book, world), ..Self::default() }
	}

	/// Loads return a snapshot taken before sleeping; saves sleep before writing. Widens the
	/// window between a load and the matching save.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);

		self
	}

	pub fn fail_loads(&self, fail: bool) {
		self.fail_loads.store(fail, Ordering::SeqCst);
	}

	pub fn fail_saves(&self, fail: bool) {
		self.fail_saves.store(fail, Ordering::SeqCst);
	}

	pub fn saves(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn snapshot(&self, book: &str) -> WorldBook {
		self.inner.snapshot(book)
	}
}

impl KnowledgeStore for FlakyStore {
	fn load<'a>(&'a self, book: &'a str) -> BoxFuture<'a, lore_storage::Result<WorldBook>> {
		Box::pin(async move {
			if self.fail_loads.load(Ordering::SeqCst) {
				return Err(lore_storage::Error::Unavailable("load disabled".to_string()));
			}

			let world = self.inner.load(book).await?;

			if let Some(latency) = self.latency {
				tokio::time::sleep(latency).await;
			}

			Ok(world)
		})
	}

	fn save<'a>(
		&'a self,
		book: &'a str,
		world: &'a WorldBook,
	) -> BoxFuture<'a, lore_storage::Result<()>> {
		Box::pin(async move {
			if self.fail_saves.load(Ordering::SeqCst) {
				return Err(lore_storage::Error::Unavailable("save disabled".to_string()));
			}

			if let Some(latency) = self.latency {
				tokio::time::sleep(latency).await;
			}

			self.inner.save(book, world).await?;
			self.saves.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

/// Host that records notices and book refreshes.
#[derive(Default)]
pub struct RecordingHost {
	notices: Mutex<Vec<(NoticeLevel, String)>>,
	changed: Mutex<Vec<String>>,
	context_tokens: Option<u32>,
}
impl RecordingHost {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_context_tokens(tokens: u32) -> Self {
		Self { context_tokens: Some(tokens), ..Self::default() }
	}

	pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
		lock(&self.notices).clone()
	}

	pub fn changed_books(&self) -> Vec<String> {
		lock(&self.changed).clone()
	}
}

impl HostCapabilities for RecordingHost {
	fn notify(&self, level: NoticeLevel, message: &str) {
		lock(&self.notices).push((level, message.to_string()));
	}

	fn world_info_changed(&self, book: &str) {
		lock(&self.changed).push(book.to_string());
	}

	fn context_tokens(&self, _conversation_id: &str) -> Option<u32> {
		self.context_tokens
	}
}

/// Everything a service test touches, kept so assertions can reach the doubles.
pub struct Harness {
	pub service: Arc<LoreService>,
	pub store: Arc<FlakyStore>,
	pub generator: Arc<ScriptedGenerator>,
	pub transcripts: Arc<TranscriptCache>,
	pub host: Arc<RecordingHost>,
}
impl Harness {
	pub fn new(cfg: Config, generator: ScriptedGenerator) -> Self {
		Self::with_store(cfg, generator, FlakyStore::new())
	}

	pub fn with_store(cfg: Config, generator: ScriptedGenerator, store: FlakyStore) -> Self {
		Self::build(cfg, generator, store, RecordingHost::new())
	}

	pub fn build(
		cfg: Config,
		generator: ScriptedGenerator,
		store: FlakyStore,
		host: RecordingHost,
	) -> Self {
		let store = Arc::new(store);
		let generator = Arc::new(generator);
		let transcripts = Arc::new(TranscriptCache::new());
		let host = Arc::new(host);
		let service = LoreService::with_providers(
			cfg,
			store.clone(),
			transcripts.clone(),
			Providers::new(generator.clone()),
		)
		.with_host(host.clone());

		Self { service: Arc::new(service), store, generator, transcripts, host }
	}

	pub fn push_transcript(&self, messages: Vec<RawMessage>) {
		self.transcripts.replace(CONVERSATION, messages);
	}
}

/// Defaults with generous budgets and a short generator timeout.
pub fn test_config() -> Config {
	let mut cfg = Config::default();

	cfg.providers.generator.timeout_ms = 2_000;
	cfg.trigger.debounce_ms = 3_000;
	cfg.trigger.min_interval_ms = 5_000;
	cfg.trigger.message_threshold = 5;

	cfg
}

pub fn message(role: &str, name: &str, text: &str) -> RawMessage {
	RawMessage {
		text: text.to_string(),
		role: Some(role.to_string()),
		name: Some(name.to_string()),
		..RawMessage::default()
	}
}

/// `count` alternating user/assistant messages, `floor N: <text>` each.
pub fn numbered_transcript(count: usize) -> Vec<RawMessage> {
	(0..count)
		.map(|idx| {
			let (role, name) = if idx % 2 == 0 { ("user", "Alice") } else { ("assistant", "Mira") };

			message(role, name, &format!("floor {idx}: 两人在雨夜的咖啡馆里聊了很久"))
		})
		.collect()
}

/// Temporary books directory, removed on drop.
pub struct TempBooks {
	dir: PathBuf,
}
impl TempBooks {
	pub fn new() -> Result<Self> {
		let dir = env::temp_dir().join(format!("lore_books_{}", Uuid::new_v4().simple()));

		fs::create_dir_all(&dir)?;

		Ok(Self { dir })
	}

	pub fn path(&self) -> &Path {
		&self.dir
	}
}
impl Drop for TempBooks {
	fn drop(&mut self) {
		let _ = fs::remove_dir_all(&self.dir);
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
