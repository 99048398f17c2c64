#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
	Info,
	Warning,
	Error,
}

/// Optional host hooks. Every method defaults to a no-op so hosts implement only what they
/// support.
pub trait HostCapabilities
where
	Self: Send + Sync,
{
	/// One-line, user-facing status message.
	fn notify(&self, _level: NoticeLevel, _message: &str) {}

	/// Called after a book was saved so the host can refresh its editor.
	fn world_info_changed(&self, _book: &str) {}

	/// The host's own context-window token count, when it tracks one.
	fn context_tokens(&self, _conversation_id: &str) -> Option<u32> {
		None
	}
}

/// Host with no capabilities.
pub struct NoopHost;
impl HostCapabilities for NoopHost {}
