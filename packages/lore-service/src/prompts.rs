use lore_config::{Summary, Timeline};
use lore_domain::FloorRange;
use lore_providers::ChatPrompt;

use crate::transcript::MessageRecord;

const FRAGMENT_FORMAT: &str = "\
Extract durable facts from the new messages. Output one block per fact:
[标题] short label
[内容] one self-contained statement that names its subject ({{user}} or {{char}} or a name)
[关键词] comma separated trigger words

Rules:
- One fact per block. No recaps, chapter summaries, or timelines.
- Skip anything the existing knowledge already states, in any language.
- If nothing new is worth keeping, answer exactly: 无";

const SEGMENT_FORMAT: &str = "\
Condense the messages into 3 to 8 chronological bullet lines.
Each line: - [time label] what happened
Use the default time label when the messages give no better one. Output bullets only.";

const MERGE_FORMAT: &str = "\
Merge the outline segments into one chronological list of bullet lines.
Each line: - [time label] what happened
Remove repeated events. Keep every time label. Output bullets only.";

const CHAPTER_FORMAT: &str = "\
Compress the older outline lines into 2 or 3 chapter bullets.
Each line: - [time span] what happened in that stretch
Keep names, turning points, and promises. Output bullets only.";

pub(crate) fn summary(
	cfg: &Summary,
	context: &str,
	date_span: Option<&str>,
	range: FloorRange,
	records: &[MessageRecord],
) -> ChatPrompt {
	let system = format!(
		"{}\n\n{FRAGMENT_FORMAT}\n- Labels have at most {} characters. At most {} blocks.",
		cfg.persona.trim(),
		cfg.max_label_chars,
		cfg.max_fragments_per_run
	);
	let mut user = String::new();

	if !context.is_empty() {
		user.push_str("Existing knowledge:\n");
		user.push_str(context);
		user.push_str("\n\n");
	}
	if let Some(span) = date_span {
		user.push_str(&format!("Dates: {span}\n"));
	}

	user.push_str(&format!("New messages (floors {range}):\n"));
	user.push_str(&lines(records));

	ChatPrompt { system, user, max_tokens: cfg.max_output_tokens }
}

pub(crate) fn segment(cfg: &Timeline, label: &str, records: &[MessageRecord]) -> ChatPrompt {
	ChatPrompt {
		system: SEGMENT_FORMAT.to_string(),
		user: format!("Default time label: {label}\n\nMessages:\n{}", lines(records)),
		max_tokens: cfg.max_output_tokens,
	}
}

pub(crate) fn merge(cfg: &Timeline, segments: &[&str]) -> ChatPrompt {
	let body = segments
		.iter()
		.enumerate()
		.map(|(idx, segment)| format!("Segment {}:\n{segment}", idx + 1))
		.collect::<Vec<_>>()
		.join("\n\n");

	ChatPrompt { system: MERGE_FORMAT.to_string(), user: body, max_tokens: cfg.max_output_tokens }
}

pub(crate) fn chapters(cfg: &Timeline, older: &[&str]) -> ChatPrompt {
	ChatPrompt {
		system: CHAPTER_FORMAT.to_string(),
		user: older.join("\n"),
		max_tokens: cfg.max_output_tokens,
	}
}

fn lines(records: &[MessageRecord]) -> String {
	records.iter().map(MessageRecord::prompt_line).collect::<Vec<_>>().join("\n")
}
