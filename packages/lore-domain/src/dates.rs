use std::sync::LazyLock;

use regex::Regex;
use time::{Date, Month, OffsetDateTime, format_description::well_known::Rfc3339};

use crate::FloorRange;

static ISO_DATE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").ok());
static ZH_FULL_DATE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*[日号]").ok());
static ZH_MONTH_DAY: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(\d{1,2})\s*月\s*(\d{1,2})\s*[日号]").ok());
static EN_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(
		r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
	)
	.ok()
});

const RELATIVE_DAYS: [&str; 16] = [
	"第二天", "次日", "翌日", "前天", "昨天", "今天", "明天", "后天", "当天", "next day",
	"the following day", "yesterday", "today", "tomorrow", "that day", "days later",
];
const TIMES_OF_DAY: [&str; 19] = [
	"凌晨", "清晨", "早上", "上午", "中午", "下午", "傍晚", "晚上", "深夜", "午夜", "当晚",
	"dawn", "morning", "afternoon", "noon", "evening", "midnight", "tonight", "night",
];

/// Raw timestamp as the host hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
	Text(String),
	EpochMillis(i64),
}

/// First calendar date literal found in `text`, as `YYYY-MM-DD` or `MM-DD` when no year is
/// given.
pub fn extract_date(text: &str) -> Option<String> {
	if let Some(caps) = ISO_DATE.as_ref().and_then(|re| re.captures(text))
		&& let Some(date) = full_date(&caps[1], &caps[2], &caps[3])
	{
		return Some(date);
	}
	if let Some(caps) = ZH_FULL_DATE.as_ref().and_then(|re| re.captures(text))
		&& let Some(date) = full_date(&caps[1], &caps[2], &caps[3])
	{
		return Some(date);
	}
	if let Some(caps) = EN_DATE.as_ref().and_then(|re| re.captures(text))
		&& let Some(month) = month_number(&caps[1])
		&& let Some(date) = full_date(&caps[3], &month.to_string(), &caps[2])
	{
		return Some(date);
	}
	if let Some(caps) = ZH_MONTH_DAY.as_ref().and_then(|re| re.captures(text)) {
		let month: u8 = caps[1].parse().ok()?;
		let day: u8 = caps[2].parse().ok()?;

		if (1..=12).contains(&month) && (1..=31).contains(&day) {
			return Some(format!("{month:02}-{day:02}"));
		}
	}

	None
}

pub fn timestamp_date(timestamp: &Timestamp) -> Option<String> {
	match timestamp {
		Timestamp::EpochMillis(millis) => {
			let nanos = i128::from(*millis).checked_mul(1_000_000)?;
			let at = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;

			Some(format_date(at.date()))
		},
		Timestamp::Text(raw) => {
			let raw = raw.trim();

			if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
				return Some(format_date(at.date()));
			}

			extract_date(raw)
		},
	}
}

/// Relative day and time-of-day phrases, e.g. `次日 晚上` or `next day evening`.
pub fn relative_label(text: &str) -> Option<String> {
	let lowered = text.to_lowercase();
	let day = RELATIVE_DAYS.iter().find(|phrase| lowered.contains(*phrase));
	let time = TIMES_OF_DAY.iter().find(|phrase| lowered.contains(*phrase));

	match (day, time) {
		(Some(day), Some(time)) => Some(format!("{day} {time}")),
		(Some(phrase), None) | (None, Some(phrase)) => Some((*phrase).to_string()),
		(None, None) => None,
	}
}

/// `first ~ last` over the known dates, or the single date when they agree.
pub fn date_span<'a, I>(dates: I) -> Option<String>
where
	I: IntoIterator<Item = &'a str>,
{
	let mut iter = dates.into_iter();
	let first = iter.next()?;
	let last = iter.last().unwrap_or(first);

	if first == last { Some(first.to_string()) } else { Some(format!("{first} ~ {last}")) }
}

/// Label for a batch of messages: a literal date wins over a relative phrase, which wins over
/// the coarse floor range.
pub fn batch_label<'a, I>(texts: I, dates: &[Option<String>], range: FloorRange) -> String
where
	I: IntoIterator<Item = &'a str>,
{
	if let Some(span) = date_span(dates.iter().filter_map(|date| date.as_deref())) {
		return span;
	}

	let mut relative = None;

	for text in texts {
		if let Some(date) = extract_date(text) {
			return date;
		}
		if relative.is_none() {
			relative = relative_label(text);
		}
	}

	relative.unwrap_or_else(|| format!("floors {range}"))
}

fn full_date(year: &str, month: &str, day: &str) -> Option<String> {
	let year: i32 = year.parse().ok()?;
	let month: u8 = month.parse().ok()?;
	let day: u8 = day.parse().ok()?;
	let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;

	Some(format_date(date))
}

fn format_date(date: Date) -> String {
	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn month_number(name: &str) -> Option<u8> {
	let month = match name.to_ascii_lowercase().as_str() {
		"jan" => 1,
		"feb" => 2,
		"mar" => 3,
		"apr" => 4,
		"may" => 5,
		"jun" => 6,
		"jul" => 7,
		"aug" => 8,
		"sep" | "sept" => 9,
		"oct" => 10,
		"nov" => 11,
		"dec" => 12,
		_ => return None,
	};

	Some(month)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recognizes_common_literals() {
		assert_eq!(extract_date("日记 2024/3/5 晴").as_deref(), Some("2024-03-05"));
		assert_eq!(extract_date("2023年12月24日，平安夜").as_deref(), Some("2023-12-24"));
		assert_eq!(extract_date("March 5th, 2024 at noon").as_deref(), Some("2024-03-05"));
		assert_eq!(extract_date("五一前的4月30日").as_deref(), Some("04-30"));
		assert_eq!(extract_date("2024-02-30"), None);
		assert_eq!(extract_date("nothing"), None);
	}

	#[test]
	fn timestamps_resolve_to_dates() {
		assert_eq!(
			timestamp_date(&Timestamp::Text("2024-05-01T23:10:00Z".to_string())).as_deref(),
			Some("2024-05-01")
		);
		assert_eq!(
			timestamp_date(&Timestamp::EpochMillis(1_714_521_600_000)).as_deref(),
			Some("2024-05-01")
		);
		assert_eq!(
			timestamp_date(&Timestamp::Text("May 1, 2024 11:10pm".to_string())).as_deref(),
			Some("2024-05-01")
		);
	}

	#[test]
	fn relative_phrases_combine_day_and_time() {
		assert_eq!(relative_label("次日晚上他们去了集市").as_deref(), Some("次日 晚上"));
		assert_eq!(relative_label("In the Morning light").as_deref(), Some("morning"));
		assert_eq!(relative_label("no marker"), None);
	}

	#[test]
	fn batch_label_prefers_literal_dates() {
		let range = FloorRange::new(10, 19);

		assert_eq!(
			batch_label(["次日晚上", "2024-05-02 的集市"], &[None, None], range),
			"2024-05-02"
		);
		assert_eq!(batch_label(["次日晚上"], &[None], range), "次日 晚上");
		assert_eq!(batch_label(["平静的一天过去了"], &[None], range), "floors 10-19");

		let dates = [Some("2024-05-01".to_string()), None, Some("2024-05-03".to_string())];

		assert_eq!(batch_label(["x", "y", "z"], &dates, range), "2024-05-01 ~ 2024-05-03");
	}
}
