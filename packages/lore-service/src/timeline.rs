use serde::{Deserialize, Serialize};

use crate::{
	LoreService, NoticeLevel, Result, RunKind, prompts,
	transcript::{self, MessageRecord},
};
use lore_domain::{FloorRange, NO_FLOOR, dates, text, tokens::estimate_tokens};

const MAX_SEGMENT_BULLETS: usize = 8;
const MAX_CHAPTER_BULLETS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineRequest {
	pub book: String,
	pub conversation_id: String,
	/// Explicit floors. `None` continues after the floors the outline already covers.
	pub range: Option<FloorRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineStatus {
	Updated,
	Unchanged,
	RangeEmpty,
	AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineReport {
	pub conversation_id: String,
	pub status: TimelineStatus,
	pub range: Option<FloorRange>,
	pub segments: usize,
	pub compressed: bool,
	pub outline: String,
}

impl LoreService {
	pub async fn run_timeline_update(&self, req: TimelineRequest) -> Result<TimelineReport> {
		let TimelineRequest { book, conversation_id, range } = req;
		let mut report = TimelineReport {
			conversation_id: conversation_id.clone(),
			status: TimelineStatus::AlreadyRunning,
			range: None,
			segments: 0,
			compressed: false,
			outline: String::new(),
		};
		let Some(_guard) = self.session.try_begin(RunKind::Timeline, &conversation_id) else {
			tracing::info!(
				conversation_id = %conversation_id,
				"Timeline update already running. Request dropped."
			);

			return Ok(report);
		};
		let records = self.read_transcript(&conversation_id).await?;
		let existing = self.try_get_timeline(&book, &conversation_id).await?;
		let previous = existing.as_ref().map(|entry| entry.outline.clone()).unwrap_or_default();
		let covered = existing.as_ref().and_then(|entry| entry.covered);
		let range = select_range(&records, covered, range);
		let batch = transcript::select(&records, range);

		report.outline = previous.clone();

		if range.is_empty() || batch.is_empty() {
			report.status = TimelineStatus::RangeEmpty;

			return Ok(report);
		}

		report.range = Some(range);

		let chunk = (self.cfg.timeline.segment_batch_messages as usize).max(1);
		let mut segments = Vec::new();

		for messages in batch.chunks(chunk) {
			if let Some(segment) = self.generate_segment(messages).await? {
				segments.push(segment);
			}
		}

		let covered = match covered {
			Some(done) =>
				FloorRange::new(done.start.min(range.start), done.end.max(range.end)),
			None => range,
		};

		report.segments = segments.len();

		if segments.is_empty() {
			report.status = TimelineStatus::Unchanged;

			if existing.is_some() {
				self.upsert_timeline(&book, &conversation_id, &previous, Some(covered)).await?;
			}

			return Ok(report);
		}

		let merged = self.merge_segments(&segments).await;
		let appended = [previous.trim(), merged.trim()]
			.into_iter()
			.filter(|part| !part.is_empty())
			.collect::<Vec<_>>()
			.join("\n");
		let outline = self.compress(&appended).await;

		self.upsert_timeline(&book, &conversation_id, &outline, Some(covered)).await?;

		report.status = TimelineStatus::Updated;
		report.compressed = outline != appended;
		report.outline = outline;

		tracing::info!(
			book = %book,
			conversation_id = %conversation_id,
			range = %range,
			segments = report.segments,
			compressed = report.compressed,
			"Timeline updated."
		);
		self.host.notify(NoticeLevel::Info, &format!("Timeline updated with floors {range}."));

		Ok(report)
	}

	/// Condenses one batch into labelled bullets. `None` when the batch has too little text to
	/// be worth a generator call.
	pub async fn generate_segment(&self, messages: &[MessageRecord]) -> Result<Option<String>> {
		let messages = messages
			.iter()
			.filter(|record| !record.text.trim().is_empty())
			.cloned()
			.collect::<Vec<_>>();
		let effective =
			messages.iter().map(|record| text::grapheme_len(&record.text)).sum::<usize>();
		let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
			return Ok(None);
		};

		if effective < self.cfg.timeline.min_effective_chars as usize {
			tracing::debug!(effective, "Segment skipped for lack of text.");

			return Ok(None);
		}

		let range = FloorRange::new(first.index, last.index);
		let known_dates =
			messages.iter().map(|record| record.parsed_date.clone()).collect::<Vec<_>>();
		let label = dates::batch_label(
			messages.iter().map(|record| record.text.as_str()),
			&known_dates,
			range,
		);
		let raw = self.generate(&prompts::segment(&self.cfg.timeline, &label, &messages)).await?;
		let bullets = normalize_bullets(&raw, Some(&label), MAX_SEGMENT_BULLETS);

		Ok((!bullets.is_empty()).then(|| bullets.join("\n")))
	}

	/// Joins segments chronologically. Small inputs are concatenated; larger ones are merged by
	/// the generator, falling back to concatenation when that fails.
	pub async fn merge_segments(&self, segments: &[String]) -> String {
		let segments = segments
			.iter()
			.map(|segment| segment.trim())
			.filter(|segment| !segment.is_empty())
			.collect::<Vec<_>>();
		let joined = segments.join("\n");

		let small = estimate_tokens(&joined) <= self.cfg.timeline.merge_token_budget;

		if segments.len() <= 3 && small {
			return joined;
		}

		match self.generate(&prompts::merge(&self.cfg.timeline, &segments)).await {
			Ok(raw) => {
				let bullets = normalize_bullets(&raw, None, usize::MAX);

				if bullets.is_empty() { joined } else { bullets.join("\n") }
			},
			Err(err) => {
				tracing::warn!(error = %err, "Segment merge failed. Falling back to concatenation.");

				joined
			},
		}
	}

	/// Keeps `outline` within `timeline.token_budget` by folding its older half into chapter
	/// bullets. Returns the input unchanged when the budget cannot be met.
	pub async fn compress(&self, outline: &str) -> String {
		let budget = self.cfg.timeline.token_budget;

		if estimate_tokens(outline) <= budget {
			return outline.to_string();
		}

		let line_count = outline.lines().filter(|line| !line.trim().is_empty()).count();
		let mut current = outline.to_string();

		for pass in 0..max_passes(line_count) {
			let lines = current.lines().filter(|line| !line.trim().is_empty()).collect::<Vec<_>>();

			if lines.len() < 2 {
				break;
			}

			let (older, newer) = lines.split_at(lines.len() / 2);
			let chapters = match self.generate(&prompts::chapters(&self.cfg.timeline, older)).await {
				Ok(raw) => normalize_bullets(&raw, None, MAX_CHAPTER_BULLETS),
				Err(err) => {
					tracing::warn!(error = %err, pass, "Timeline compression failed.");

					return outline.to_string();
				},
			};

			if chapters.is_empty() {
				tracing::warn!(pass, "Timeline compression returned no bullets.");

				return outline.to_string();
			}

			let next = chapters
				.iter()
				.map(String::as_str)
				.chain(newer.iter().copied())
				.collect::<Vec<_>>()
				.join("\n");

			if estimate_tokens(&next) >= estimate_tokens(&current) {
				break;
			}

			current = next;

			if estimate_tokens(&current) <= budget {
				tracing::debug!(pass, tokens = estimate_tokens(&current), "Timeline compressed.");

				return current;
			}
		}

		tracing::warn!(budget, "Timeline could not be compressed within budget.");

		outline.to_string()
	}
}

fn select_range(
	records: &[MessageRecord],
	covered: Option<FloorRange>,
	requested: Option<FloorRange>,
) -> FloorRange {
	let last_index = records.len() as i64 - 1;

	match requested {
		Some(range) => FloorRange::new(range.start.max(0), range.end.min(last_index)),
		None => {
			let done = covered.map(|range| range.end).unwrap_or(NO_FLOOR);

			FloorRange::new(done + 1, last_index)
		},
	}
}

/// `ceil(log2(lines)) + 1`.
fn max_passes(lines: usize) -> u32 {
	let ceil_log2 = match lines {
		0 | 1 => 0,
		n => usize::BITS - (n - 1).leading_zeros(),
	};

	ceil_log2 + 1
}

/// Rewrites generator output as `- [label] text` lines. Lines without a leading `[label]` get
/// `fallback` when one is given.
fn normalize_bullets(raw: &str, fallback: Option<&str>, max: usize) -> Vec<String> {
	raw.lines()
		.map(strip_bullet)
		.filter(|line| !line.is_empty() && !line.starts_with("```"))
		.filter(|line| !line.chars().all(|ch| matches!(ch, '-' | '=' | '*' | '_')))
		.map(|line| match fallback {
			Some(label) if !(line.starts_with('[') && line.contains(']')) =>
				format!("- [{label}] {line}"),
			_ => format!("- {line}"),
		})
		.take(max)
		.collect()
}

fn strip_bullet(line: &str) -> &str {
	let line = line.trim();

	if line.chars().all(|ch| matches!(ch, '-' | '=' | '*' | '_')) {
		return line;
	}

	let line = line.trim_start_matches(['-', '*', '•', '·']).trim_start();
	let digits = line.len() - line.trim_start_matches(|ch: char| ch.is_ascii_digit()).len();

	if digits > 0 {
		let rest = &line[digits..];

		if let Some(rest) = rest.strip_prefix(['.', ')', '、']) {
			return rest.trim_start();
		}
	}

	line
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bullets_gain_the_fallback_label() {
		let raw = "```\n1. 两人在车站重逢\n- [次日 晚上] 一起吃饭\n* 约定周末见面\n---\n```";

		assert_eq!(
			normalize_bullets(raw, Some("2024-05-01"), 8),
			vec![
				"- [2024-05-01] 两人在车站重逢",
				"- [次日 晚上] 一起吃饭",
				"- [2024-05-01] 约定周末见面",
			]
		);
	}

	#[test]
	fn bullets_are_capped() {
		let raw = (0..12).map(|idx| format!("- event {idx}")).collect::<Vec<_>>().join("\n");

		assert_eq!(normalize_bullets(&raw, None, MAX_SEGMENT_BULLETS).len(), 8);
	}

	#[test]
	fn numbers_inside_text_are_kept() {
		assert_eq!(strip_bullet("2024年的冬天"), "2024年的冬天");
		assert_eq!(strip_bullet("3) third"), "third");
	}

	#[test]
	fn pass_bound_grows_logarithmically() {
		assert_eq!(max_passes(1), 1);
		assert_eq!(max_passes(2), 2);
		assert_eq!(max_passes(8), 4);
		assert_eq!(max_passes(9), 5);
	}

	#[test]
	fn automatic_range_continues_after_coverage() {
		let raw = (0..50)
			.map(|idx| crate::RawMessage { text: format!("m{idx}"), ..crate::RawMessage::default() })
			.collect::<Vec<_>>();
		let records = transcript::read_transcript(&raw);

		assert_eq!(
			select_range(&records, Some(FloorRange::new(0, 39)), None),
			FloorRange::new(40, 49)
		);
		assert_eq!(select_range(&records, None, None), FloorRange::new(0, 49));
	}
}
