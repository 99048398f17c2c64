use std::sync::LazyLock;

use regex::{Captures, Regex};
use unicode_segmentation::UnicodeSegmentation;

static THINKING_BLOCK: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?is)<(think|thinking)>.*?</(think|thinking)>").ok());
static MARKUP_TAG: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>").ok());
static BOOKKEEPING_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(
		r"(?ix)
		^\s*(?:
			last_summarized_floor\s*[:=]
			| \[总结进度\]
			| \d{4}-\d{2}-\d{2}[\x20T]\d{2}:\d{2}(?::\d{2})?\S*\s*$
			| (?:updated|更新于)\s*[:：]
		)",
	)
	.ok()
});

/// Host placeholder tags that look like markup but carry meaning.
const PLACEHOLDER_TAGS: [&str; 2] = ["<user>", "<char>"];

/// Normalizes a raw chat message into a single prompt-friendly line: reasoning blocks and
/// markup are dropped, whitespace is collapsed.
pub fn clean_message(raw: &str) -> String {
	let mut text = raw.to_string();

	if let Some(re) = THINKING_BLOCK.as_ref() {
		text = re.replace_all(&text, " ").into_owned();
	}
	if let Some(re) = MARKUP_TAG.as_ref() {
		text = re
			.replace_all(&text, |caps: &Captures<'_>| {
				let tag = &caps[0];

				if PLACEHOLDER_TAGS.iter().any(|keep| tag.eq_ignore_ascii_case(keep)) {
					tag.to_string()
				} else {
					" ".to_string()
				}
			})
			.into_owned();
	}

	collapse_whitespace(&text)
}

pub fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max` user-perceived characters.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
	text.graphemes(true).take(max).collect()
}

pub fn grapheme_len(text: &str) -> usize {
	text.graphemes(true).count()
}

/// Drops progress markers and timestamp lines so they never leak into prompts.
pub fn strip_bookkeeping_lines(text: &str) -> String {
	let Some(re) = BOOKKEEPING_LINE.as_ref() else {
		return text.to_string();
	};

	text.lines().filter(|line| !re.is_match(line)).collect::<Vec<_>>().join("\n")
}

/// Keeps whole lines from the front of `lines` while the joined text stays within `max_chars`.
pub fn bounded_lines<'a, I>(lines: I, max_chars: usize) -> String
where
	I: IntoIterator<Item = &'a str>,
{
	let mut out = String::new();
	let mut used = 0;

	for line in lines {
		let cost = line.chars().count() + usize::from(!out.is_empty());

		if used + cost > max_chars {
			break;
		}
		if !out.is_empty() {
			out.push('\n');
		}

		out.push_str(line);

		used += cost;
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clean_message_drops_reasoning_and_markup() {
		let raw = "<think>plan the reply</think><p>Hello <b>there</b>,\n\n  <user>!</p>";

		assert_eq!(clean_message(raw), "Hello there , <user>!");
	}

	#[test]
	fn truncation_respects_grapheme_boundaries() {
		assert_eq!(truncate_graphemes("喜欢-热可可和棉花糖饼干", 10), "喜欢-热可可和棉花糖");
		assert_eq!(truncate_graphemes("e\u{301}e\u{301}", 1), "e\u{301}");
	}

	#[test]
	fn bookkeeping_lines_are_removed() {
		let text = "喜欢: 热可可\nlast_summarized_floor: 19\n2024-05-01 12:00:00\n害怕: 雷声";

		assert_eq!(strip_bookkeeping_lines(text), "喜欢: 热可可\n害怕: 雷声");
	}

	#[test]
	fn bounded_lines_keeps_whole_lines_only() {
		let out = bounded_lines(["aaaa", "bbbb", "cccc"], 9);

		assert_eq!(out, "aaaa\nbbbb");
	}
}
