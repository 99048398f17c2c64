use lore_domain::{
	FloorRange,
	tags::{self, EntryKind},
	tokens::estimate_tokens,
};
use lore_service::{TimelineRequest, TimelineStatus, transcript};
use lore_testkit::{
	BOOK, CONVERSATION, Harness, ScriptedGenerator, message, numbered_transcript, test_config,
};

fn request(range: Option<FloorRange>) -> TimelineRequest {
	TimelineRequest { book: BOOK.to_string(), conversation_id: CONVERSATION.to_string(), range }
}

fn long_outline(lines: usize) -> String {
	(1..=lines)
		.map(|day| format!("- [day {day}] 两人在雨夜的咖啡馆里聊了很久"))
		.collect::<Vec<_>>()
		.join("\n")
}

#[tokio::test]
async fn short_batches_skip_the_generator() {
	let harness = Harness::new(test_config(), ScriptedGenerator::new());
	let records = transcript::read_transcript(&[
		message("user", "Alice", "嗯"),
		message("assistant", "Mira", "   "),
		message("user", "Alice", "ok"),
	]);
	let segment = harness.service.generate_segment(&records).await.expect("Segment failed.");

	assert_eq!(segment, None);
	assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn segment_bullets_get_the_batch_date() {
	let generator = ScriptedGenerator::new().reply("1. 两人在车站重逢\n- [傍晚] 沿着河边散步");
	let harness = Harness::new(test_config(), generator);
	let records = transcript::read_transcript(&[
		message("user", "Alice", "2024-05-01 我们终于在车站见面了，好久不见"),
		message("assistant", "Mira", "是啊，我们去河边走走吧，天气正好"),
	]);
	let segment = harness
		.service
		.generate_segment(&records)
		.await
		.expect("Segment failed.")
		.expect("Segment was skipped.");

	assert_eq!(segment, "- [2024-05-01] 两人在车站重逢\n- [傍晚] 沿着河边散步");
	assert!(harness.generator.prompts()[0].user.starts_with("Default time label: 2024-05-01"));
}

#[tokio::test]
async fn few_small_segments_are_concatenated() {
	let harness = Harness::new(test_config(), ScriptedGenerator::new());
	let merged = harness
		.service
		.merge_segments(&["- [a] one".to_string(), " ".to_string(), "- [b] two\n".to_string()])
		.await;

	assert_eq!(merged, "- [a] one\n- [b] two");
	assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn many_segments_fall_back_to_concatenation_on_failure() {
	let harness = Harness::new(test_config(), ScriptedGenerator::new().fail("merge exploded"));
	let segments = (1..=4).map(|idx| format!("- [day {idx}] event")).collect::<Vec<_>>();
	let merged = harness.service.merge_segments(&segments).await;

	assert_eq!(harness.generator.calls(), 1);
	assert_eq!(merged, segments.join("\n"));
}

#[tokio::test]
async fn many_segments_are_merged_by_the_generator() {
	let harness = Harness::new(
		test_config(),
		ScriptedGenerator::new().reply("- [day 1] event\n- [day 2 ~ day 4] events"),
	);
	let segments = (1..=4).map(|idx| format!("- [day {idx}] event")).collect::<Vec<_>>();

	assert_eq!(
		harness.service.merge_segments(&segments).await,
		"- [day 1] event\n- [day 2 ~ day 4] events"
	);
}

#[tokio::test]
async fn outlines_within_budget_are_untouched() {
	let harness = Harness::new(test_config(), ScriptedGenerator::new());
	let outline = long_outline(5);

	assert_eq!(harness.service.compress(&outline).await, outline);
	assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn compression_reaches_the_budget() {
	let mut cfg = test_config();

	cfg.timeline.token_budget = 60;

	let harness = Harness::new(cfg, ScriptedGenerator::repeating("- [前期] 初识"));
	let outline = long_outline(20);
	let compressed = harness.service.compress(&outline).await;

	assert!(estimate_tokens(&outline) > 60);
	assert!(estimate_tokens(&compressed) <= 60);
	assert!(compressed.starts_with("- [前期] 初识"));
	assert!(compressed.ends_with("- [day 20] 两人在雨夜的咖啡馆里聊了很久"));
}

#[tokio::test]
async fn compression_failure_returns_the_original() {
	let mut cfg = test_config();

	cfg.timeline.token_budget = 60;

	let harness = Harness::new(cfg, ScriptedGenerator::new().fail("no capacity"));
	let outline = long_outline(20);

	assert_eq!(harness.service.compress(&outline).await, outline);
}

#[tokio::test]
async fn unreachable_budget_returns_the_original() {
	let mut cfg = test_config();

	cfg.timeline.token_budget = 1;

	let harness = Harness::new(cfg, ScriptedGenerator::repeating("- [前期] 两人在雨夜的咖啡馆里相识"));
	let outline = long_outline(4);

	assert_eq!(harness.service.compress(&outline).await, outline);
}

#[tokio::test]
async fn updates_append_and_remember_coverage() {
	let generator = ScriptedGenerator::new()
		.reply("- 初次见面\n- 约好下次再聊")
		.reply("- 第二次见面");
	let harness = Harness::new(test_config(), generator);

	harness.push_transcript(numbered_transcript(10));

	let first = harness.service.run_timeline_update(request(None)).await.expect("Update failed.");

	assert_eq!(first.status, TimelineStatus::Updated);
	assert_eq!(first.range, Some(FloorRange::new(0, 9)));
	assert_eq!(first.outline, "- [floors 0-9] 初次见面\n- [floors 0-9] 约好下次再聊");

	let again = harness.service.run_timeline_update(request(None)).await.expect("Update failed.");

	assert_eq!(again.status, TimelineStatus::RangeEmpty);

	harness.push_transcript(numbered_transcript(14));

	let next = harness.service.run_timeline_update(request(None)).await.expect("Update failed.");

	assert_eq!(next.range, Some(FloorRange::new(10, 13)));
	assert!(next.outline.ends_with("- [floors 10-13] 第二次见面"));

	let stored = harness
		.service
		.get_timeline(BOOK, CONVERSATION)
		.await
		.expect("Timeline entry missing.");

	assert_eq!(stored.outline, next.outline);
	assert_eq!(stored.covered, Some(FloorRange::new(0, 13)));

	let world = harness.store.snapshot(BOOK);
	let entry = world
		.entries
		.values()
		.find(|entry| matches!(EntryKind::parse(&entry.comment), EntryKind::Timeline { .. }))
		.expect("Timeline entry missing.");

	assert!(entry.constant);
	assert_eq!(entry.order, 50);
	assert!(entry.comment.starts_with(tags::TIMELINE_TAG));
	assert_eq!(world.entries.len(), 1);
}
