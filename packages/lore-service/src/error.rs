pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Transcript error: {message}")]
	Transcript { message: String },
	#[error("Generation timed out after {timeout_ms} ms.")]
	GenerationTimeout { timeout_ms: u64 },
	#[error("Generation failed: {message}")]
	GenerationFailed { message: String },
	#[error("Generator output had {malformed} malformed blocks and no usable fragment.")]
	ParseFailure { malformed: usize },
	#[error("Store read failed: {message}")]
	StoreReadFailure { message: String },
	#[error("Store write failed: {message}")]
	StoreWriteFailure { message: String },
}
impl Error {
	/// Kinds that may succeed when the same request is sent again unchanged.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::GenerationTimeout { .. }
				| Self::GenerationFailed { .. }
				| Self::ParseFailure { .. }
				| Self::StoreReadFailure { .. }
				| Self::StoreWriteFailure { .. }
		)
	}

	/// Stable machine-readable code for HTTP bodies and logs.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "INVALID_REQUEST",
			Self::Transcript { .. } => "TRANSCRIPT_UNAVAILABLE",
			Self::GenerationTimeout { .. } => "GENERATION_TIMEOUT",
			Self::GenerationFailed { .. } => "GENERATION_FAILED",
			Self::ParseFailure { .. } => "PARSE_FAILURE",
			Self::StoreReadFailure { .. } => "STORE_READ_FAILURE",
			Self::StoreWriteFailure { .. } => "STORE_WRITE_FAILURE",
		}
	}

	pub(crate) fn store_read(err: lore_storage::Error) -> Self {
		match err {
			lore_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::StoreReadFailure { message: other.to_string() },
		}
	}

	pub(crate) fn store_write(err: lore_storage::Error) -> Self {
		match err {
			lore_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::StoreWriteFailure { message: other.to_string() },
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generation_and_store_failures_are_retryable() {
		assert!(Error::GenerationTimeout { timeout_ms: 10 }.is_retryable());
		assert!(Error::StoreWriteFailure { message: "disk full".to_string() }.is_retryable());
		assert!(!Error::InvalidRequest { message: "bad book".to_string() }.is_retryable());
	}

	#[test]
	fn invalid_book_names_are_not_store_failures() {
		let err = Error::store_read(lore_storage::Error::InvalidArgument("x".to_string()));

		assert_eq!(err.code(), "INVALID_REQUEST");
	}
}
