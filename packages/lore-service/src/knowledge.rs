use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::{Error, LoreService, NoticeLevel, Result};
use lore_domain::{
	FloorRange, MemoryFragment, NO_FLOOR,
	tags::{self, EntryKind},
	text,
	writegate::{self, RejectCode},
};
use lore_storage::models::{Position, WorldBook, WorldEntry};

/// Counts for one `write_fragments` call. `skipped` includes every rejected fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
	pub created: usize,
	pub skipped: usize,
	pub misclassified: usize,
	pub duplicates: usize,
}

impl LoreService {
	/// Known facts of the conversation, one `label: content` line each, bounded by
	/// `summary.context_max_chars`.
	pub async fn existing_context(&self, book: &str, conversation_id: &str) -> String {
		match self.store.load(book).await {
			Ok(world) =>
				render_context(&world, conversation_id, self.cfg.summary.context_max_chars),
			Err(err) => {
				tracing::warn!(
					error = %err,
					book,
					conversation_id,
					"Failed to load existing context."
				);

				String::new()
			},
		}
	}

	pub async fn write_fragments(
		&self,
		book: &str,
		conversation_id: &str,
		fragments: &[MemoryFragment],
		range: Option<FloorRange>,
	) -> WriteOutcome {
		match self.try_write_fragments(book, conversation_id, fragments, range).await {
			Ok(outcome) => outcome,
			Err(err) => {
				tracing::warn!(error = %err, book, conversation_id, "Failed to write fragments.");

				WriteOutcome { skipped: fragments.len(), ..WriteOutcome::default() }
			},
		}
	}

	/// Gates, deduplicates and inserts `fragments`, then advances the floor marker to
	/// `range.end`. Everything lands in a single save.
	pub async fn try_write_fragments(
		&self,
		book: &str,
		conversation_id: &str,
		fragments: &[MemoryFragment],
		range: Option<FloorRange>,
	) -> Result<WriteOutcome> {
		let _book = self.lock_book(book).await;
		let mut world = self.store.load(book).await.map_err(Error::store_read)?;
		let (outcome, changed) = self.apply_fragments(&mut world, conversation_id, fragments, range);

		if changed {
			self.store.save(book, &world).await.map_err(Error::store_write)?;
			self.host.world_info_changed(book);
		}

		tracing::info!(
			book,
			conversation_id,
			created = outcome.created,
			skipped = outcome.skipped,
			misclassified = outcome.misclassified,
			duplicates = outcome.duplicates,
			"Fragments written."
		);

		Ok(outcome)
	}

	/// In-memory half of a fragment write. Returns the counts and whether `world` changed.
	pub(crate) fn apply_fragments(
		&self,
		world: &mut WorldBook,
		conversation_id: &str,
		fragments: &[MemoryFragment],
		range: Option<FloorRange>,
	) -> (WriteOutcome, bool) {
		let position = Position::from_name(&self.cfg.summary.position).unwrap_or_default();
		let existing = world
			.owned_by(conversation_id)
			.filter(|entry| matches!(EntryKind::parse(&entry.comment), EntryKind::Fragment { .. }))
			.map(|entry| entry.content.clone())
			.collect::<Vec<_>>();
		let mut accepted: Vec<String> = Vec::new();
		let mut outcome = WriteOutcome::default();

		for fragment in fragments {
			if let Err(code) = writegate::writegate(fragment, &self.cfg.summary) {
				tracing::debug!(
					conversation_id,
					label = %fragment.label,
					reason = crate::reject_reason_code(code),
					"Fragment rejected by write gate."
				);

				if code == RejectCode::RejectMisclassified {
					outcome.misclassified += 1;
				}

				outcome.skipped += 1;

				continue;
			}

			let candidates = accepted.iter().chain(existing.iter()).map(String::as_str);

			if let Some((_, reason)) = self.dedup().find_duplicate(&fragment.content, candidates) {
				tracing::debug!(
					conversation_id,
					label = %fragment.label,
					reason = ?reason,
					"Fragment duplicates known content."
				);

				outcome.duplicates += 1;
				outcome.skipped += 1;

				continue;
			}

			let order = world.free_order(position, self.cfg.summary.order_floor);
			let key = if fragment.keywords.is_empty() {
				vec![fragment.label.clone()]
			} else {
				fragment.keywords.clone()
			};

			world.insert(WorldEntry {
				key,
				comment: EntryKind::Fragment { label: fragment.label.clone(), range }.render(),
				content: fragment.content.clone(),
				order,
				position,
				owner_conversation: Some(conversation_id.to_string()),
				..WorldEntry::default()
			});
			accepted.push(fragment.content.clone());

			outcome.created += 1;
		}

		let advanced = match range {
			Some(range) => advance_marker(world, conversation_id, range.end),
			None => false,
		};

		(outcome, outcome.created > 0 || advanced)
	}

	/// Highest summarized floor of the conversation, or `NO_FLOOR`.
	pub async fn last_summarized_floor(&self, book: &str, conversation_id: &str) -> i64 {
		match self.try_last_summarized_floor(book, conversation_id).await {
			Ok(floor) => floor,
			Err(err) => {
				tracing::warn!(error = %err, book, conversation_id, "Failed to read floor marker.");

				NO_FLOOR
			},
		}
	}

	/// Reads the floor marker, falling back to the highest floor named by the conversation's own
	/// tagged entries. Never writes.
	pub async fn try_last_summarized_floor(
		&self,
		book: &str,
		conversation_id: &str,
	) -> Result<i64> {
		let world = self.store.load(book).await.map_err(Error::store_read)?;

		Ok(marker_floor(&world, conversation_id)
			.or_else(|| scanned_floor(&world, conversation_id))
			.unwrap_or(NO_FLOOR))
	}

	/// Writes the scanned fallback floor back as a marker when the conversation has none, so the
	/// scan happens once. Returns the conversation's floor.
	pub async fn migrate_floor_marker(&self, book: &str, conversation_id: &str) -> Result<i64> {
		let _book = self.lock_book(book).await;
		let mut world = self.store.load(book).await.map_err(Error::store_read)?;

		if let Some(floor) = marker_floor(&world, conversation_id) {
			return Ok(floor);
		}

		let Some(floor) = scanned_floor(&world, conversation_id) else {
			return Ok(NO_FLOOR);
		};

		advance_marker(&mut world, conversation_id, floor);

		match self.store.save(book, &world).await {
			Ok(()) => tracing::info!(book, conversation_id, floor, "Floor marker migrated."),
			Err(err) => tracing::warn!(
				error = %err,
				book,
				conversation_id,
				floor,
				"Failed to persist migrated floor marker."
			),
		}

		Ok(floor)
	}

	/// Enables every disabled entry the conversation owns. Entries of other conversations are
	/// left alone.
	pub async fn set_active_entries_for_conversation(
		&self,
		book: &str,
		conversation_id: &str,
	) -> usize {
		let _book = self.lock_book(book).await;
		let mut world = match self.store.load(book).await {
			Ok(world) => world,
			Err(err) => {
				tracing::warn!(
					error = %err,
					book,
					conversation_id,
					"Failed to load book for activation."
				);

				return 0;
			},
		};
		let mut enabled = 0;

		for entry in world.entries.values_mut() {
			if entry.is_owned_by(conversation_id)
				&& entry.disable
				&& EntryKind::parse(&entry.comment) != EntryKind::FloorMarker
			{
				entry.disable = false;
				enabled += 1;
			}
		}

		if enabled == 0 {
			return 0;
		}
		if let Err(err) = self.store.save(book, &world).await {
			tracing::warn!(
				error = %err,
				book,
				conversation_id,
				"Failed to save activated entries."
			);
			self.host.notify(NoticeLevel::Warning, &format!("Could not enable entries: {err}"));

			return 0;
		}

		self.host.world_info_changed(book);

		enabled
	}

	pub async fn get_timeline(&self, book: &str, conversation_id: &str) -> Option<TimelineEntry> {
		match self.store.load(book).await {
			Ok(world) => timeline_entry(&world, conversation_id),
			Err(err) => {
				tracing::warn!(error = %err, book, conversation_id, "Failed to load timeline.");

				None
			},
		}
	}

	pub(crate) async fn try_get_timeline(
		&self,
		book: &str,
		conversation_id: &str,
	) -> Result<Option<TimelineEntry>> {
		let world = self.store.load(book).await.map_err(Error::store_read)?;

		Ok(timeline_entry(&world, conversation_id))
	}

	/// Replaces the conversation's timeline entry, creating it on first use.
	pub async fn upsert_timeline(
		&self,
		book: &str,
		conversation_id: &str,
		outline: &str,
		covered: Option<FloorRange>,
	) -> Result<()> {
		let _book = self.lock_book(book).await;
		let mut world = self.store.load(book).await.map_err(Error::store_read)?;
		let comment = EntryKind::Timeline { range: covered }.render();
		let existing = world.find_mut(|entry| {
			entry.is_owned_by(conversation_id)
				&& matches!(EntryKind::parse(&entry.comment), EntryKind::Timeline { .. })
		});

		match existing {
			Some(entry) => {
				entry.comment = comment;
				entry.content = outline.to_string();
				entry.constant = true;
			},
			None => {
				let position = Position::from_name(&self.cfg.timeline.position).unwrap_or_default();

				world.insert(WorldEntry {
					comment,
					content: outline.to_string(),
					constant: true,
					order: self.cfg.timeline.order,
					position,
					owner_conversation: Some(conversation_id.to_string()),
					..WorldEntry::default()
				});
			},
		}

		self.store.save(book, &world).await.map_err(Error::store_write)?;
		self.host.world_info_changed(book);

		Ok(())
	}

	/// Held across every load-edit-save of `book`.
	pub(crate) async fn lock_book(&self, book: &str) -> OwnedMutexGuard<()> {
		self.books.acquire(book).await
	}
}

/// Stored outline and the floors it already covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
	pub outline: String,
	pub covered: Option<FloorRange>,
}

pub fn render_context(world: &WorldBook, conversation_id: &str, max_chars: u32) -> String {
	let mut entries = world
		.owned_by(conversation_id)
		.filter(|entry| !entry.disable)
		.filter_map(|entry| {
			let line = match EntryKind::parse(&entry.comment) {
				EntryKind::Fragment { label, .. } => format!("{label}: {}", flatten(&entry.content)),
				EntryKind::RangeSummary { range } =>
					format!("floors {range}: {}", flatten(&entry.content)),
				_ => return None,
			};

			Some((entry.order, entry.uid, line))
		})
		.filter(|(_, _, line)| !line.ends_with(": "))
		.collect::<Vec<_>>();

	entries.sort_by_key(|(order, uid, _)| (*order, *uid));

	text::bounded_lines(entries.iter().map(|(_, _, line)| line.as_str()), max_chars as usize)
}

fn flatten(content: &str) -> String {
	text::collapse_whitespace(&text::strip_bookkeeping_lines(content))
}

fn marker_floor(world: &WorldBook, conversation_id: &str) -> Option<i64> {
	world
		.owned_by(conversation_id)
		.filter(|entry| EntryKind::parse(&entry.comment) == EntryKind::FloorMarker)
		.filter_map(|entry| tags::parse_marker_content(&entry.content))
		.max()
}

/// Unowned entries belong to no conversation and never count.
fn scanned_floor(world: &WorldBook, conversation_id: &str) -> Option<i64> {
	world
		.owned_by(conversation_id)
		.filter_map(|entry| EntryKind::parse(&entry.comment).summarized_range())
		.map(|range| range.end)
		.max()
}

/// Moves the marker to `max(current, floor)`. Returns whether the book changed.
fn advance_marker(world: &mut WorldBook, conversation_id: &str, floor: i64) -> bool {
	let marker = world.find_mut(|entry| {
		entry.is_owned_by(conversation_id)
			&& EntryKind::parse(&entry.comment) == EntryKind::FloorMarker
	});

	if let Some(entry) = marker {
		let current = tags::parse_marker_content(&entry.content).unwrap_or(NO_FLOOR);

		if floor <= current {
			return false;
		}

		entry.content = tags::marker_content(floor);

		return true;
	}

	world.insert(WorldEntry {
		comment: EntryKind::FloorMarker.render(),
		content: tags::marker_content(floor),
		disable: true,
		owner_conversation: Some(conversation_id.to_string()),
		..WorldEntry::default()
	});

	true
}

fn timeline_entry(world: &WorldBook, conversation_id: &str) -> Option<TimelineEntry> {
	world.owned_by(conversation_id).find_map(|entry| match EntryKind::parse(&entry.comment) {
		EntryKind::Timeline { range } =>
			Some(TimelineEntry { outline: entry.content.clone(), covered: range }),
		_ => None,
	})
}
