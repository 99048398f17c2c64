//! Tolerant parser for generator output.
//!
//! Expected shape, one block per fact:
//!
//! ```text
//! [标题] 喜欢-热可可
//! [内容] {{user}}喜欢在雨夜喝热可可
//! [关键词] 热可可, 雨夜
//! ```
//!
//! Bracketed (`[标题]`, `【标题】`) and colon (`标题:`, `Title:`, `label:`) tags are accepted in
//! Chinese or English. A title line opens a new block; untagged lines extend the current
//! content. Blocks without both a title and content are dropped and counted.

use std::sync::LazyLock;

use regex::Regex;

use crate::{MemoryFragment, text};

static TAGGED_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(
		r"^(?:[-*•]\s*)?(?:\d+[.)、]\s*)?(?:\[(?P<b>[^\]]{1,12})\]|【(?P<c>[^】]{1,12})】|\*\*(?P<s>[^*]{1,12})\*\*\s*[:：]?|(?P<p>[^:：\s\[\]【】]{1,12})\s*[:：])\s*(?P<rest>.*)$",
	)
	.ok()
});

const EMPTY_REPLIES: [&str; 8] =
	["无", "没有", "无新信息", "none", "n/a", "no new facts", "no new information", "nothing new"];
const KEYWORD_SEPARATORS: [char; 7] = [',', '，', '、', ';', '；', '|', '/'];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFragments {
	pub fragments: Vec<MemoryFragment>,
	/// Blocks dropped for missing a title or content.
	pub malformed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
	Title,
	Content,
	Keywords,
}

#[derive(Default)]
struct Block {
	title: String,
	content: Vec<String>,
	keywords: Vec<String>,
}

pub fn parse_fragments(raw: &str, max_label_chars: usize) -> ParsedFragments {
	let mut parsed = ParsedFragments::default();
	let body = strip_fences(raw);

	if is_empty_reply(&body) {
		return parsed;
	}

	let mut current: Option<Block> = None;

	for line in body.lines() {
		let line = line.trim();

		if line.is_empty() || is_separator(line) {
			continue;
		}

		match tagged(line) {
			Some((Field::Title, rest)) => {
				if let Some(block) = current.take() {
					finish(block, max_label_chars, &mut parsed);
				}

				current = Some(Block { title: rest, ..Block::default() });
			},
			Some((Field::Content, rest)) => {
				let block = current.get_or_insert_with(Block::default);

				if !rest.is_empty() {
					block.content.push(rest);
				}
			},
			Some((Field::Keywords, rest)) => {
				let block = current.get_or_insert_with(Block::default);

				block.keywords.extend(split_keywords(&rest));
			},
			None =>
				if let Some(block) = current.as_mut() {
					block.content.push(line.to_string());
				},
		}
	}

	if let Some(block) = current.take() {
		finish(block, max_label_chars, &mut parsed);
	}

	parsed
}

pub fn split_keywords(raw: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();

	for piece in raw.split(KEYWORD_SEPARATORS) {
		let keyword = piece.trim().trim_matches(['"', '\'', '#', '`']).trim();

		if keyword.is_empty() || out.iter().any(|existing| existing == keyword) {
			continue;
		}

		out.push(keyword.to_string());
	}

	out
}

fn finish(block: Block, max_label_chars: usize, parsed: &mut ParsedFragments) {
	let title = clean_title(&block.title);
	let content = text::collapse_whitespace(&block.content.join(" "));

	if title.is_empty() || content.is_empty() {
		parsed.malformed += 1;

		return;
	}

	let mut keywords: Vec<String> = Vec::new();

	for keyword in block.keywords {
		if !keywords.contains(&keyword) {
			keywords.push(keyword);
		}
	}

	parsed.fragments.push(MemoryFragment {
		label: text::truncate_graphemes(&title, max_label_chars),
		content,
		keywords,
	});
}

fn tagged(line: &str) -> Option<(Field, String)> {
	let caps = TAGGED_LINE.as_ref()?.captures(line)?;
	let name = ["b", "c", "s", "p"].iter().find_map(|group| caps.name(group))?.as_str();
	let field = field_for(name)?;
	let rest = caps.name("rest").map(|m| m.as_str().trim().to_string()).unwrap_or_default();

	Some((field, rest))
}

fn field_for(name: &str) -> Option<Field> {
	let name = name.trim().to_lowercase();
	let field = match name.as_str() {
		"标题" | "名称" | "标签" | "title" | "label" | "name" => Field::Title,
		"内容" | "事实" | "描述" | "content" | "fact" | "text" => Field::Content,
		"关键词" | "关键字" | "keywords" | "keyword" | "keys" | "tags" => Field::Keywords,
		_ => return None,
	};

	Some(field)
}

fn clean_title(raw: &str) -> String {
	raw.trim().trim_matches(['"', '\'', '“', '”', '「', '」', '*', '`']).trim().to_string()
}

fn strip_fences(raw: &str) -> String {
	raw.lines().filter(|line| !line.trim_start().starts_with("```")).collect::<Vec<_>>().join("\n")
}

fn is_separator(line: &str) -> bool {
	line.len() >= 3 && line.chars().all(|ch| matches!(ch, '-' | '=' | '*' | '_' | '—'))
}

fn is_empty_reply(body: &str) -> bool {
	let lowered = body
		.trim()
		.trim_matches(|ch: char| ch.is_ascii_punctuation() || matches!(ch, '。' | '（' | '）'))
		.trim()
		.to_lowercase();

	lowered.is_empty() || EMPTY_REPLIES.contains(&lowered.as_str())
}
