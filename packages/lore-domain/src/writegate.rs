use crate::{MemoryFragment, tags, text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
	RejectEmpty,
	RejectTooLong,
	/// The generator produced a summary or bookkeeping block instead of a single fact.
	RejectMisclassified,
}

pub fn writegate(fragment: &MemoryFragment, cfg: &lore_config::Summary) -> Result<(), RejectCode> {
	if fragment.label.trim().is_empty() || fragment.content.trim().is_empty() {
		return Err(RejectCode::RejectEmpty);
	}
	if text::grapheme_len(&fragment.content) > cfg.max_fragment_chars as usize {
		return Err(RejectCode::RejectTooLong);
	}
	if is_misclassified(fragment, &cfg.blocklist) {
		return Err(RejectCode::RejectMisclassified);
	}

	Ok(())
}

/// Labels containing a blocklisted phrase, or content that opens with one, are summaries in
/// disguise. Blocklist phrases are expected lowercase.
fn is_misclassified(fragment: &MemoryFragment, blocklist: &[String]) -> bool {
	let label = fragment.label.to_lowercase();
	let content = fragment.content.trim().trim_start_matches(['[', '【', '#', ' ']).to_lowercase();

	if content.contains(tags::MARKER_FIELD) {
		return true;
	}

	blocklist.iter().any(|phrase| {
		let bare = phrase.trim_matches(['[', ']', '【', '】']);

		label.contains(phrase.as_str())
			|| (!bare.is_empty() && label.contains(bare))
			|| content.starts_with(phrase.as_str())
			|| (!bare.is_empty() && content.starts_with(bare))
	})
}
