use serde::{Deserialize, Serialize};

use crate::{
	Error, LoreService, NoticeLevel, Result, RunKind, prompts,
	transcript::{self, MessageRecord},
};
use lore_domain::{FloorRange, fragments};

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRequest {
	pub book: String,
	pub conversation_id: String,
	/// Explicit floors. `None` summarizes everything past the floor marker.
	pub range: Option<FloorRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryStatus {
	Completed,
	RangeEmpty,
	AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
	pub conversation_id: String,
	pub status: SummaryStatus,
	pub range: Option<FloorRange>,
	pub created: usize,
	pub skipped: usize,
	pub misclassified: usize,
	pub duplicates: usize,
	pub parse_failures: usize,
	pub new_floor: i64,
}
impl SummaryReport {
	fn idle(conversation_id: &str, status: SummaryStatus, new_floor: i64) -> Self {
		Self {
			conversation_id: conversation_id.to_string(),
			status,
			range: None,
			created: 0,
			skipped: 0,
			misclassified: 0,
			duplicates: 0,
			parse_failures: 0,
			new_floor,
		}
	}

	/// One line for the host's notification area.
	pub fn describe(&self) -> String {
		match (self.status, self.range) {
			(SummaryStatus::Completed, Some(range)) => format!(
				"Summarized floors {range}: {} created, {} skipped.",
				self.created, self.skipped
			),
			(SummaryStatus::AlreadyRunning, _) => "A summary is already running.".to_string(),
			_ => "Nothing new to summarize.".to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStage {
	Idle,
	RangeSelected,
	ContextGathered,
	LlmCalled,
	FragmentsParsed,
	Deduped,
	Written,
	Failed,
}

struct RunTrace<'a> {
	conversation_id: &'a str,
	stage: RunStage,
}
impl<'a> RunTrace<'a> {
	fn new(conversation_id: &'a str) -> Self {
		Self { conversation_id, stage: RunStage::Idle }
	}

	fn advance(&mut self, next: RunStage) {
		tracing::debug!(
			conversation_id = self.conversation_id,
			from = ?self.stage,
			to = ?next,
			"Summary run stage changed."
		);

		self.stage = next;
	}
}

impl LoreService {
	pub async fn run_summary(&self, req: SummaryRequest) -> Result<SummaryReport> {
		let SummaryRequest { book, conversation_id, range } = req;
		let Some(_guard) = self.session.try_begin(RunKind::Summary, &conversation_id) else {
			tracing::info!(
				conversation_id = %conversation_id,
				"Summary already running. Request dropped."
			);

			let floor = self.last_summarized_floor(&book, &conversation_id).await;
			let report = SummaryReport::idle(&conversation_id, SummaryStatus::AlreadyRunning, floor);

			return Ok(report);
		};
		let mut trace = RunTrace::new(&conversation_id);
		let result = self.summarize(&book, &conversation_id, range, &mut trace).await;

		match &result {
			Ok(report) => {
				trace.advance(RunStage::Idle);
				self.host.notify(NoticeLevel::Info, &report.describe());
			},
			Err(err) => {
				trace.advance(RunStage::Failed);
				tracing::warn!(
					error = %err,
					book = %book,
					conversation_id = %conversation_id,
					retryable = err.is_retryable(),
					"Summary run failed."
				);
				self.host.notify(NoticeLevel::Error, &format!("Summary failed: {err}"));
				trace.advance(RunStage::Idle);
			},
		}

		result
	}

	async fn summarize(
		&self,
		book: &str,
		conversation_id: &str,
		requested: Option<FloorRange>,
		trace: &mut RunTrace<'_>,
	) -> Result<SummaryReport> {
		let records = self.read_transcript(conversation_id).await?;
		let last = self.migrate_floor_marker(book, conversation_id).await?;
		let range = select_range(&records, last, requested);
		let batch = transcript::select(&records, range);

		trace.advance(RunStage::RangeSelected);

		if range.is_empty() || batch.is_empty() {
			tracing::debug!(conversation_id, range = %range, "No visible messages in range.");

			return Ok(SummaryReport::idle(conversation_id, SummaryStatus::RangeEmpty, last));
		}

		let context = self.existing_context(book, conversation_id).await;
		let span = transcript::date_span(&batch);

		trace.advance(RunStage::ContextGathered);

		let prompt = prompts::summary(&self.cfg.summary, &context, span.as_deref(), range, &batch);
		let raw = self.generate(&prompt).await?;

		trace.advance(RunStage::LlmCalled);

		let parsed = fragments::parse_fragments(&raw, self.cfg.summary.max_label_chars as usize);

		if parsed.fragments.is_empty() && parsed.malformed > 0 {
			return Err(Error::ParseFailure { malformed: parsed.malformed });
		}

		let mut fragments = parsed.fragments;
		let cap = self.cfg.summary.max_fragments_per_run as usize;
		let overflow = fragments.len().saturating_sub(cap);

		fragments.truncate(cap);
		trace.advance(RunStage::FragmentsParsed);

		let book_guard = self.lock_book(book).await;
		let mut world = self.store.load(book).await.map_err(Error::store_read)?;
		let (outcome, changed) =
			self.apply_fragments(&mut world, conversation_id, &fragments, Some(range));

		trace.advance(RunStage::Deduped);

		if changed {
			self.store.save(book, &world).await.map_err(Error::store_write)?;
			self.host.world_info_changed(book);
		}

		drop(book_guard);
		trace.advance(RunStage::Written);

		let report = SummaryReport {
			conversation_id: conversation_id.to_string(),
			status: SummaryStatus::Completed,
			range: Some(range),
			created: outcome.created,
			skipped: outcome.skipped + overflow,
			misclassified: outcome.misclassified,
			duplicates: outcome.duplicates,
			parse_failures: parsed.malformed,
			new_floor: last.max(range.end),
		};

		tracing::info!(
			book,
			conversation_id,
			range = %range,
			created = report.created,
			skipped = report.skipped,
			parse_failures = report.parse_failures,
			floor = report.new_floor,
			"Summary run completed."
		);

		Ok(report)
	}
}

/// Manual ranges are clamped to the transcript. Automatic ranges start right after `last`.
fn select_range(
	records: &[MessageRecord],
	last: i64,
	requested: Option<FloorRange>,
) -> FloorRange {
	let last_index = records.len() as i64 - 1;

	match requested {
		Some(range) => FloorRange::new(range.start.max(0), range.end.min(last_index)),
		None => FloorRange::new(last + 1, last_index),
	}
}
