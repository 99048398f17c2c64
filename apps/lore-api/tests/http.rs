use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::Value;
use tower::util::ServiceExt;

use lore_api::{routes, state::AppState};
use lore_config::Config;
use lore_service::Providers;
use lore_storage::{
	memory::MemoryStore,
	models::{WorldBook, WorldEntry},
};
use lore_testkit::{BOOK, CONVERSATION, ScriptedGenerator, numbered_transcript, test_config};

const TWO_FRAGMENTS: &str = "\
[标题] 喜欢-热可可
[内容] {{user}}喜欢在雨夜喝热可可
[关键词] 热可可
[标题] 旧伤
[内容] {{char}}左肩有一道旧伤疤
";

fn app(config: Config, generator: ScriptedGenerator) -> Router {
	let state = AppState::with_parts(
		config,
		Arc::new(MemoryStore::new()),
		Providers::new(Arc::new(generator)),
	);

	routes::router(state)
}

fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
	Request::builder()
		.method(method)
		.uri(uri)
		.header("content-type", "application/json")
		.body(Body::from(payload.to_string()))
		.expect("Failed to build request.")
}

fn conversation_uri(action: &str) -> String {
	format!("/v1/conversations/{CONVERSATION}/{action}")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
	let response = app.clone().oneshot(request).await.expect("Failed to call the router.");
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, json)
}

async fn upload_transcript(app: &Router, count: usize) {
	let messages =
		serde_json::to_value(numbered_transcript(count)).expect("Failed to encode transcript.");
	let payload = serde_json::json!({ "messages": messages });
	let (status, json) =
		send(app, json_request("PUT", &conversation_uri("transcript"), payload)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["messages"], count);
}

#[tokio::test]
async fn health_ok() {
	let app = app(test_config(), ScriptedGenerator::new());
	let request =
		Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request.");
	let (status, _) = send(&app, request).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bearer_token_guards_conversation_routes() {
	let mut config = test_config();

	config.security.api_auth_token = Some("secret".to_string());

	let app = app(config, ScriptedGenerator::new());
	let (status, json) = send(
		&app,
		Request::builder()
			.uri(conversation_uri("floor"))
			.body(Body::empty())
			.expect("Failed to build request."),
	)
	.await;

	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(json["error_code"], "UNAUTHORIZED");

	let (status, json) = send(
		&app,
		Request::builder()
			.uri(conversation_uri("floor"))
			.header("authorization", "Bearer secret")
			.body(Body::empty())
			.expect("Failed to build request."),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["last_summarized_floor"], -1);

	let request =
		Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request.");

	assert_eq!(send(&app, request).await.0, StatusCode::OK);
}

#[tokio::test]
async fn summary_writes_fragments_and_moves_the_floor() {
	let app = app(test_config(), ScriptedGenerator::new().reply(TWO_FRAGMENTS));

	upload_transcript(&app, 12).await;

	let (status, json) = send(
		&app,
		json_request("POST", &conversation_uri("summary"), serde_json::json!({})),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["status"], "COMPLETED");
	assert_eq!(json["created"], 2);
	assert_eq!(json["new_floor"], 11);

	let (status, json) = send(
		&app,
		Request::builder()
			.uri(format!("{}?book=lore", conversation_uri("floor")))
			.body(Body::empty())
			.expect("Failed to build request."),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["conversation_id"], CONVERSATION);
	assert_eq!(json["last_summarized_floor"], 11);
}

#[tokio::test]
async fn floor_lookup_does_not_write_the_book() {
	let mut world = WorldBook::default();

	world.insert(WorldEntry {
		comment: "[楼层总结] 0-29".to_string(),
		owner_conversation: Some(CONVERSATION.to_string()),
		..WorldEntry::default()
	});

	let store = Arc::new(MemoryStore::with_book(BOOK, world.clone()));
	let state = AppState::with_parts(
		test_config(),
		store.clone(),
		Providers::new(Arc::new(ScriptedGenerator::new())),
	);
	let app = routes::router(state);
	let (status, json) = send(
		&app,
		Request::builder()
			.uri(conversation_uri("floor"))
			.body(Body::empty())
			.expect("Failed to build request."),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["last_summarized_floor"], 29);
	assert_eq!(store.snapshot(BOOK), world);
}

#[tokio::test]
async fn generation_failure_maps_to_bad_gateway() {
	let app = app(test_config(), ScriptedGenerator::new().fail("upstream down"));

	upload_transcript(&app, 6).await;

	let (status, json) = send(
		&app,
		json_request(
			"POST",
			&conversation_uri("summary"),
			serde_json::json!({ "range": { "start": 0, "end": 5 } }),
		),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert_eq!(json["error_code"], "GENERATION_FAILED");
	assert_eq!(json["retryable"], true);
}

#[tokio::test]
async fn path_like_book_names_are_rejected() {
	let app = app(test_config(), ScriptedGenerator::new());
	let (status, json) = send(
		&app,
		json_request("POST", &conversation_uri("summary"), serde_json::json!({ "book": "../etc" })),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn message_events_schedule_a_check() {
	let app = app(test_config(), ScriptedGenerator::new());
	let messages =
		serde_json::to_value(numbered_transcript(3)).expect("Failed to encode transcript.");
	let payload = serde_json::json!({ "messages": messages });
	let (status, json) =
		send(&app, json_request("POST", &conversation_uri("events"), payload)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["decision"], "scheduled");

	let (_, json) =
		send(&app, json_request("POST", &conversation_uri("events"), serde_json::json!({}))).await;

	assert_eq!(json["decision"], "coalesced");
}

#[tokio::test]
async fn activation_enables_owned_entries() {
	let mut world = WorldBook::default();

	for owner in [CONVERSATION, "chat-2"] {
		world.insert(WorldEntry {
			comment: "[记忆碎片] 旧伤".to_string(),
			content: "{{char}}左肩有一道旧伤疤".to_string(),
			disable: true,
			owner_conversation: Some(owner.to_string()),
			..WorldEntry::default()
		});
	}

	let state = AppState::with_parts(
		test_config(),
		Arc::new(MemoryStore::with_book(BOOK, world)),
		Providers::new(Arc::new(ScriptedGenerator::new())),
	);
	let app = routes::router(state);
	let (status, json) = send(
		&app,
		json_request("POST", &conversation_uri("activate"), serde_json::json!({ "book": BOOK })),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["conversation_id"], CONVERSATION);
	assert_eq!(json["enabled"], 1);
}

#[tokio::test]
async fn timeline_updates_return_the_outline() {
	let app = app(test_config(), ScriptedGenerator::new().reply("- 初次见面"));

	upload_transcript(&app, 10).await;

	let (status, json) = send(
		&app,
		json_request("POST", &conversation_uri("timeline"), serde_json::json!({})),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["status"], "UPDATED");
	assert_eq!(json["outline"], "- [floors 0-9] 初次见面");
}
