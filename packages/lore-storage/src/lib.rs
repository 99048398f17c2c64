pub mod file;
pub mod memory;
pub mod models;

mod error;

pub use error::Error;

use std::{future::Future, pin::Pin};

use crate::models::WorldBook;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bulk load / bulk save access to world books. Implementations never merge: `save` replaces
/// the whole book.
pub trait KnowledgeStore
where
	Self: Send + Sync,
{
	fn load<'a>(&'a self, book: &'a str) -> BoxFuture<'a, Result<WorldBook>>;

	fn save<'a>(&'a self, book: &'a str, world: &'a WorldBook) -> BoxFuture<'a, Result<()>>;
}

/// Book names become file stems, so path separators and dot names are refused.
pub fn validate_book_name(book: &str) -> Result<()> {
	let trimmed = book.trim();

	if trimmed.is_empty()
		|| trimmed != book
		|| book.contains(['/', '\\', '\0'])
		|| book == "."
		|| book == ".."
	{
		return Err(Error::InvalidArgument(format!("Book name {book:?} is not a plain file stem.")));
	}

	Ok(())
}
