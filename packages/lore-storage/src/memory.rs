use std::{collections::HashMap, sync::Mutex};

use crate::{BoxFuture, KnowledgeStore, Result, models::WorldBook};

/// Process-local store, used by tests and by hosts that keep world info elsewhere.
#[derive(Default)]
pub struct MemoryStore {
	books: Mutex<HashMap<String, WorldBook>>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_book(book: &str, world: WorldBook) -> Self {
		let store = Self::default();

		store.put(book, world);

		store
	}

	pub fn put(&self, book: &str, world: WorldBook) {
		let mut books = self.books.lock().unwrap_or_else(|err| err.into_inner());

		books.insert(book.to_string(), world);
	}

	pub fn snapshot(&self, book: &str) -> WorldBook {
		let books = self.books.lock().unwrap_or_else(|err| err.into_inner());

		books.get(book).cloned().unwrap_or_default()
	}
}

impl KnowledgeStore for MemoryStore {
	fn load<'a>(&'a self, book: &'a str) -> BoxFuture<'a, Result<WorldBook>> {
		Box::pin(async move {
			crate::validate_book_name(book)?;

			Ok(self.snapshot(book))
		})
	}

	fn save<'a>(&'a self, book: &'a str, world: &'a WorldBook) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			crate::validate_book_name(book)?;

			self.put(book, world.clone());

			Ok(())
		})
	}
}
