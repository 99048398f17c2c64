use std::{
	collections::HashMap,
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
};

use tokio::{fs, sync::Mutex as AsyncMutex};

use crate::{BoxFuture, Error, KnowledgeStore, Result, models::WorldBook};

/// One `<book>.json` file per world book under a directory. Saves go through a temp file and a
/// rename, serialized per book.
pub struct FileStore {
	dir: PathBuf,
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl FileStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into(), locks: Mutex::new(HashMap::new()) }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn book_path(&self, book: &str) -> Result<PathBuf> {
		crate::validate_book_name(book)?;

		Ok(self.dir.join(format!("{book}.json")))
	}

	fn lock_for(&self, book: &str) -> Arc<AsyncMutex<()>> {
		let mut locks = self.locks.lock().unwrap_or_else(|err| err.into_inner());

		locks.entry(book.to_string()).or_default().clone()
	}

	async fn read(&self, book: &str) -> Result<WorldBook> {
		let path = self.book_path(book)?;
		let lock = self.lock_for(book);
		let _guard = lock.lock().await;
		let raw = match fs::read(&path).await {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => {
				tracing::debug!(
					book,
					path = %path.display(),
					"World book file is missing. Starting empty."
				);

				return Ok(WorldBook::default());
			},
			Err(err) => return Err(Error::Io(err)),
		};

		if raw.iter().all(u8::is_ascii_whitespace) {
			return Ok(WorldBook::default());
		}

		Ok(serde_json::from_slice(&raw)?)
	}

	async fn write(&self, book: &str, world: &WorldBook) -> Result<()> {
		let path = self.book_path(book)?;
		let tmp = self.dir.join(format!(".{book}.json.tmp"));
		let payload = serde_json::to_vec_pretty(world)?;
		let lock = self.lock_for(book);
		let _guard = lock.lock().await;

		fs::create_dir_all(&self.dir).await?;
		fs::write(&tmp, &payload).await?;
		fs::rename(&tmp, &path).await?;

		tracing::debug!(book, entries = world.entries.len(), "World book saved.");

		Ok(())
	}
}

impl KnowledgeStore for FileStore {
	fn load<'a>(&'a self, book: &'a str) -> BoxFuture<'a, Result<WorldBook>> {
		Box::pin(self.read(book))
	}

	fn save<'a>(&'a self, book: &'a str, world: &'a WorldBook) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.write(book, world))
	}
}
