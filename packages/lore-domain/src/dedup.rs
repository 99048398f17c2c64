use unicode_normalization::UnicodeNormalization;

use crate::{
	cjk,
	glossary::{self, Glossary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
	Exact,
	Containment,
	CrossLingual,
	Fuzzy,
}

pub struct DedupEngine {
	similarity_threshold: f32,
	containment_threshold: f32,
	glossary: Glossary,
}
impl DedupEngine {
	pub fn new(cfg: &lore_config::Dedup) -> Self {
		Self {
			similarity_threshold: cfg.similarity_threshold,
			containment_threshold: cfg.containment_threshold,
			glossary: Glossary::new(&cfg.equivalents),
		}
	}

	pub fn is_duplicate(&self, candidate: &str, existing: &str) -> bool {
		self.check(candidate, existing).is_some()
	}

	/// Runs the comparison ladder and reports the first rule that matched.
	pub fn check(&self, candidate: &str, existing: &str) -> Option<DuplicateReason> {
		let raw_candidate = candidate.trim();
		let raw_existing = existing.trim();

		if raw_candidate.is_empty() || raw_existing.is_empty() {
			return None;
		}

		let a = normalize(raw_candidate);
		let b = normalize(raw_existing);

		if a.is_empty() || b.is_empty() {
			return (raw_candidate == raw_existing).then_some(DuplicateReason::Exact);
		}
		if a == b {
			return Some(DuplicateReason::Exact);
		}

		let a_chars = a.chars().collect::<Vec<_>>();
		let b_chars = b.chars().collect::<Vec<_>>();
		let (shorter, longer, shorter_len, longer_len) = if a_chars.len() <= b_chars.len() {
			(&a, &b, a_chars.len(), b_chars.len())
		} else {
			(&b, &a, b_chars.len(), a_chars.len())
		};

		if longer.contains(shorter.as_str())
			&& shorter_len as f32 > self.containment_threshold * longer_len as f32
		{
			return Some(DuplicateReason::Containment);
		}
		if self.same_concepts(&a, &b) {
			return Some(DuplicateReason::CrossLingual);
		}
		if similarity(&a_chars, &b_chars) > self.similarity_threshold {
			return Some(DuplicateReason::Fuzzy);
		}

		None
	}

	/// Index of the first entry in `existing` that `candidate` duplicates.
	pub fn find_duplicate<'a, I>(
		&self,
		candidate: &str,
		existing: I,
	) -> Option<(usize, DuplicateReason)>
	where
		I: IntoIterator<Item = &'a str>,
	{
		existing
			.into_iter()
			.enumerate()
			.find_map(|(idx, text)| self.check(candidate, text).map(|reason| (idx, reason)))
	}

	/// Concept sequences must agree in order, so swapping subject and object is a new fact.
	fn same_concepts(&self, a: &str, b: &str) -> bool {
		let (Some(left), Some(right)) = (self.glossary.concepts(a), self.glossary.concepts(b))
		else {
			return false;
		};
		let (shorter, longer) =
			if left.len() <= right.len() { (&left, &right) } else { (&right, &left) };

		if shorter.len() < 2 {
			return false;
		}
		if shorter == longer {
			return true;
		}

		is_subsequence(shorter, longer)
			&& shorter.len() as f32 > self.containment_threshold * longer.len() as f32
	}
}
impl Default for DedupEngine {
	fn default() -> Self {
		Self::new(&lore_config::Dedup::default())
	}
}

/// Canonical form used by every comparison: NFKC, lowercase, placeholders and synonym clusters
/// folded into symbols, punctuation removed, whitespace kept only between latin words.
pub fn normalize(text: &str) -> String {
	let folded = text.nfkc().collect::<String>().to_lowercase();
	let folded = glossary::replace_placeholders(&folded);
	let folded = glossary::space_between_scripts(&folded);
	let folded = glossary::collapse_clusters(&folded);
	let stripped = folded
		.chars()
		.map(|ch| {
			if ch.is_ascii_punctuation() || cjk::is_cjk_punctuation(ch) { ' ' } else { ch }
		})
		.collect::<String>();
	let words = stripped.split_whitespace().collect::<Vec<_>>();
	let mut out = String::with_capacity(stripped.len());

	for (idx, word) in words.iter().enumerate() {
		if idx > 0 {
			let prev = out.chars().last();
			let next = word.chars().next();

			if prev.is_some_and(glossary::is_latin_word) && next.is_some_and(glossary::is_latin_word)
			{
				out.push(' ');
			}
		}

		out.push_str(word);
	}

	out
}

fn is_subsequence(shorter: &[char], longer: &[char]) -> bool {
	let mut rest = longer.iter();

	shorter.iter().all(|concept| rest.any(|other| other == concept))
}

/// Character-level edit distance with two rolling rows.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
	if a.is_empty() {
		return b.len();
	}
	if b.is_empty() {
		return a.len();
	}

	let mut prev = (0..=b.len()).collect::<Vec<_>>();
	let mut curr = vec![0; b.len() + 1];

	for (i, ca) in a.iter().enumerate() {
		curr[0] = i + 1;

		for (j, cb) in b.iter().enumerate() {
			let substitution = prev[j] + usize::from(ca != cb);

			curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
		}

		std::mem::swap(&mut prev, &mut curr);
	}

	prev[b.len()]
}

/// `1 - distance / max_len`; identical empty inputs score 1.
pub fn similarity(a: &[char], b: &[char]) -> f32 {
	let max_len = a.len().max(b.len());

	if max_len == 0 {
		return 1.0;
	}

	1.0 - levenshtein(a, b) as f32 / max_len as f32
}
