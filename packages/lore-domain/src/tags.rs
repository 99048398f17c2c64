use std::sync::LazyLock;

use regex::Regex;

use crate::FloorRange;

pub const FRAGMENT_TAG: &str = "[记忆碎片]";
pub const RANGE_SUMMARY_TAG: &str = "[楼层总结]";
pub const FLOOR_MARKER_TAG: &str = "[总结进度]";
pub const TIMELINE_TAG: &str = "[时间线大纲]";
pub const MARKER_FIELD: &str = "last_summarized_floor";

static FLOOR_RANGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"(?i)(?:楼层|floors?)\s*(\d+)\s*[-~–—]\s*(\d+)").ok()
});
static BARE_RANGE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*[-~–—]\s*(\d+)").ok());
static MARKER_VALUE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"last_summarized_floor\s*[:=]\s*(-?\d+)").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
	Fragment { label: String, range: Option<FloorRange> },
	RangeSummary { range: FloorRange },
	FloorMarker,
	Timeline { range: Option<FloorRange> },
	Foreign,
}
impl EntryKind {
	pub fn parse(comment: &str) -> Self {
		let comment = comment.trim();

		if comment.starts_with(FLOOR_MARKER_TAG) {
			return Self::FloorMarker;
		}
		if let Some(rest) = comment.strip_prefix(TIMELINE_TAG) {
			return Self::Timeline { range: floor_range_in(rest) };
		}
		if let Some(rest) = comment.strip_prefix(FRAGMENT_TAG) {
			let range = floor_range_in(rest);
			let label = match rest.rfind(" (") {
				Some(idx) if range.is_some() => &rest[..idx],
				_ => rest,
			};

			return Self::Fragment { label: label.trim().to_string(), range };
		}
		if let Some(rest) = comment.strip_prefix(RANGE_SUMMARY_TAG) {
			if let Some(range) = bare_range(rest).or_else(|| floor_range_in(rest)) {
				return Self::RangeSummary { range };
			}
		} else if let Some(range) = floor_range_in(comment) {
			return Self::RangeSummary { range };
		}

		Self::Foreign
	}

	pub fn render(&self) -> String {
		match self {
			Self::Fragment { label, range: Some(range) } =>
				format!("{FRAGMENT_TAG} {label} (floors {range})"),
			Self::Fragment { label, range: None } => format!("{FRAGMENT_TAG} {label}"),
			Self::RangeSummary { range } => format!("{RANGE_SUMMARY_TAG} {range}"),
			Self::FloorMarker => FLOOR_MARKER_TAG.to_string(),
			Self::Timeline { range: Some(range) } => format!("{TIMELINE_TAG} (floors {range})"),
			Self::Timeline { range: None } => TIMELINE_TAG.to_string(),
			Self::Foreign => String::new(),
		}
	}

	/// Floor range recorded in the tag, if any.
	pub fn range(&self) -> Option<FloorRange> {
		match self {
			Self::Fragment { range, .. } | Self::Timeline { range } => *range,
			Self::RangeSummary { range } => Some(*range),
			_ => None,
		}
	}

	/// Ranges that count as summarized when no explicit marker exists.
	pub fn summarized_range(&self) -> Option<FloorRange> {
		match self {
			Self::Fragment { range, .. } => *range,
			Self::RangeSummary { range } => Some(*range),
			_ => None,
		}
	}

	pub fn is_bookkeeping(&self) -> bool {
		matches!(self, Self::FloorMarker | Self::Timeline { .. })
	}
}

/// Finds `floors 10-19` or `楼层 10-19` anywhere in `text`.
pub fn floor_range_in(text: &str) -> Option<FloorRange> {
	let caps = FLOOR_RANGE.as_ref()?.captures(text)?;

	range_from(&caps[1], &caps[2])
}

pub fn marker_content(floor: i64) -> String {
	format!("{MARKER_FIELD}: {floor}")
}

pub fn parse_marker_content(content: &str) -> Option<i64> {
	let caps = MARKER_VALUE.as_ref()?.captures(content)?;

	caps[1].parse().ok()
}

fn bare_range(text: &str) -> Option<FloorRange> {
	let caps = BARE_RANGE.as_ref()?.captures(text)?;

	range_from(&caps[1], &caps[2])
}

fn range_from(start: &str, end: &str) -> Option<FloorRange> {
	let start = start.parse().ok()?;
	let end = end.parse().ok()?;

	(start <= end).then(|| FloorRange::new(start, end))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fragment_tags_round_trip_label_and_range() {
		let kind = EntryKind::Fragment {
			label: "喜欢-热可可".to_string(),
			range: Some(FloorRange::new(10, 19)),
		};
		let comment = kind.render();

		assert_eq!(comment, "[记忆碎片] 喜欢-热可可 (floors 10-19)");
		assert_eq!(EntryKind::parse(&comment), kind);
	}

	#[test]
	fn legacy_comments_yield_ranges() {
		assert_eq!(
			EntryKind::parse("[楼层总结] 0-49"),
			EntryKind::RangeSummary { range: FloorRange::new(0, 49) }
		);
		assert_eq!(
			EntryKind::parse("剧情回顾 楼层 50~99"),
			EntryKind::RangeSummary { range: FloorRange::new(50, 99) }
		);
		assert_eq!(EntryKind::parse("Character sheet"), EntryKind::Foreign);
	}

	#[test]
	fn marker_content_parses_back() {
		assert_eq!(parse_marker_content(&marker_content(42)), Some(42));
		assert_eq!(parse_marker_content("last_summarized_floor = -1"), Some(-1));
		assert_eq!(parse_marker_content("nothing here"), None);
	}

	#[test]
	fn timeline_tags_carry_coverage() {
		let kind = EntryKind::Timeline { range: Some(FloorRange::new(0, 39)) };

		assert_eq!(kind.render(), "[时间线大纲] (floors 0-39)");
		assert_eq!(EntryKind::parse(&kind.render()), kind);
		assert_eq!(EntryKind::parse("[时间线大纲]"), EntryKind::Timeline { range: None });
		assert_eq!(kind.summarized_range(), None);
	}

	#[test]
	fn reversed_ranges_are_ignored() {
		assert_eq!(floor_range_in("floors 20-10"), None);
	}
}
