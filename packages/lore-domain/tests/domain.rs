use lore_config::{Dedup, Summary};
use lore_domain::{
	FloorRange, MemoryFragment,
	dedup::DedupEngine,
	fragments, tags,
	tags::EntryKind,
	tokens,
	writegate::{self, RejectCode},
};

const CORPUS: [&str; 10] = [
	"喜欢你",
	"likes you",
	"{{user}}喜欢热可可",
	"{{char}} keeps a silver locket from her mother",
	"{{char}}左肩有一道旧伤疤",
	"<user> is afraid of thunder",
	"雷雨夜里{{char}}会躲在书桌下面",
	"Ｆｕｌｌ－ｗｉｄｔｈ ｔｅｘｔ",
	"……",
	"a",
];

#[test]
fn every_non_blank_text_duplicates_itself() {
	let engine = DedupEngine::new(&Dedup::default());

	for text in CORPUS {
		assert!(engine.is_duplicate(text, text), "{text:?} must duplicate itself");
	}
}

#[test]
fn cross_lingual_like_and_fear() {
	let engine = DedupEngine::new(&Dedup::default());

	assert!(engine.is_duplicate("喜欢你", "likes you"));
	assert!(!engine.is_duplicate("喜欢你", "害怕你"));
}

#[test]
fn hot_cocoa_fragment_duplicates_existing_entry() {
	let engine = DedupEngine::new(&Dedup::default());
	let candidate = MemoryFragment {
		label: "喜欢-饮品".to_string(),
		content: "{{user}}喜欢热可可".to_string(),
		keywords: Vec::new(),
	};

	assert!(engine.is_duplicate(&candidate.content, "{{user}} likes hot cocoa"));
}

#[test]
fn world_line_summary_never_passes_the_gate() {
	let cfg = Summary::default();
	let fragment = MemoryFragment {
		label: "世界线总结".to_string(),
		content: "第一章到第三章发生的一切".to_string(),
		keywords: Vec::new(),
	};

	assert_eq!(writegate::writegate(&fragment, &cfg), Err(RejectCode::RejectMisclassified));
}

#[test]
fn three_valid_blocks_and_one_malformed() {
	let raw = "\
[标题] 喜欢-热可可
[内容] {{user}}喜欢在雨夜喝热可可
[关键词] 热可可
[标题] 旧伤
[内容] {{char}}左肩有一道旧伤疤
[标题] 坏块
[关键词] 没有内容
[标题] 怕雷
[内容] {{char}}害怕打雷
";
	let parsed = fragments::parse_fragments(raw, 10);

	assert_eq!(parsed.fragments.len(), 3);
	assert_eq!(parsed.malformed, 1);
	assert_eq!(
		parsed.fragments.iter().map(|fragment| fragment.label.as_str()).collect::<Vec<_>>(),
		vec!["喜欢-热可可", "旧伤", "怕雷"]
	);
}

#[test]
fn fragment_comment_tags_keep_their_floor_range() {
	let comment =
		EntryKind::Fragment { label: "旧伤".to_string(), range: Some(FloorRange::new(10, 19)) }
			.render();

	assert_eq!(EntryKind::parse(&comment).range(), Some(FloorRange::new(10, 19)));
	assert_eq!(tags::floor_range_in(&comment), Some(FloorRange::new(10, 19)));
}

#[test]
fn token_estimate_grows_with_text() {
	let short = tokens::estimate_tokens("{{user}}喜欢热可可");
	let long = tokens::estimate_tokens("{{user}}喜欢热可可，尤其是在下雨的夜晚。");

	assert!(long > short);
}
