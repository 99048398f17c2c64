use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
	Summary,
	Timeline,
}

/// Per-process session state: the active conversation and the runs currently in flight.
#[derive(Default)]
pub struct SessionState {
	active: Mutex<Option<String>>,
	in_flight: Mutex<HashSet<(RunKind, String)>>,
}
impl SessionState {
	pub fn active_conversation(&self) -> Option<String> {
		lock(&self.active).clone()
	}

	pub fn set_active(&self, conversation_id: &str) {
		*lock(&self.active) = Some(conversation_id.to_string());
	}

	pub fn is_running(&self, kind: RunKind, conversation_id: &str) -> bool {
		lock(&self.in_flight).contains(&(kind, conversation_id.to_string()))
	}

	/// Claims the run slot for `conversation_id`. `None` when a run of the same kind is already
	/// in flight.
	pub fn try_begin(&self, kind: RunKind, conversation_id: &str) -> Option<RunGuard<'_>> {
		let key = (kind, conversation_id.to_string());

		if !lock(&self.in_flight).insert(key.clone()) {
			return None;
		}

		Some(RunGuard { session: self, key })
	}
}

/// Releases the run slot on drop, including on early error returns.
pub struct RunGuard<'a> {
	session: &'a SessionState,
	key: (RunKind, String),
}
impl Drop for RunGuard<'_> {
	fn drop(&mut self) {
		lock(&self.session.in_flight).remove(&self.key);
	}
}

/// One async lock per book. Every load-edit-save cycle holds it so whole-book saves cannot
/// overwrite each other.
#[derive(Default)]
pub struct BookLocks {
	books: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl BookLocks {
	pub async fn acquire(&self, book: &str) -> OwnedMutexGuard<()> {
		let slot = lock(&self.books).entry(book.to_string()).or_default().clone();

		slot.lock_owned().await
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[test]
	fn second_run_is_refused_until_the_guard_drops() {
		let session = SessionState::default();
		let guard = session.try_begin(RunKind::Summary, "chat-1");

		assert!(guard.is_some());
		assert!(session.try_begin(RunKind::Summary, "chat-1").is_none());
		assert!(session.try_begin(RunKind::Timeline, "chat-1").is_some());
		assert!(session.try_begin(RunKind::Summary, "chat-2").is_some());

		drop(guard);

		assert!(!session.is_running(RunKind::Summary, "chat-1"));
		assert!(session.try_begin(RunKind::Summary, "chat-1").is_some());
	}

	#[tokio::test]
	async fn book_locks_serialize_per_book() {
		let locks = BookLocks::default();
		let held = locks.acquire("lore").await;
		let other = tokio::time::timeout(Duration::from_millis(10), locks.acquire("notes")).await;

		assert!(other.is_ok());
		assert!(
			tokio::time::timeout(Duration::from_millis(10), locks.acquire("lore")).await.is_err()
		);

		drop(held);

		assert!(
			tokio::time::timeout(Duration::from_millis(10), locks.acquire("lore")).await.is_ok()
		);
	}

	#[test]
	fn activation_replaces_the_active_conversation() {
		let session = SessionState::default();

		assert_eq!(session.active_conversation(), None);

		session.set_active("chat-1");
		session.set_active("chat-2");

		assert_eq!(session.active_conversation().as_deref(), Some("chat-2"));
	}
}
