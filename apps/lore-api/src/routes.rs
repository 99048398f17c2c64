use axum::{
	Json, Router,
	body::Body,
	extract::{Path, Query, State},
	http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use lore_domain::FloorRange;
use lore_service::{
	Error, RawMessage, SummaryReport, SummaryRequest, TimelineReport, TimelineRequest,
	TriggerDecision,
};

#[derive(Debug, Deserialize)]
pub struct TranscriptBody {
	pub messages: Vec<RawMessage>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
	pub conversation_id: String,
	pub messages: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookBody {
	#[serde(default)]
	pub book: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunBody {
	#[serde(default)]
	pub book: Option<String>,
	#[serde(default)]
	pub range: Option<FloorRange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventBody {
	#[serde(default)]
	pub book: Option<String>,
	/// Fresh transcript snapshot sent along with the event.
	#[serde(default)]
	pub messages: Option<Vec<RawMessage>>,
}

#[derive(Debug, Deserialize)]
pub struct BookQuery {
	pub book: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
	pub conversation_id: String,
	pub enabled: usize,
}

#[derive(Debug, Serialize)]
pub struct FloorResponse {
	pub conversation_id: String,
	pub last_summarized_floor: i64,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
	pub decision: TriggerDecision,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	retryable: bool,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	retryable: bool,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), retryable: false }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let status = match &err {
			Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
			Error::GenerationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			Error::Transcript { .. } | Error::GenerationFailed { .. } | Error::ParseFailure { .. } =>
				StatusCode::BAD_GATEWAY,
			Error::StoreReadFailure { .. } | Error::StoreWriteFailure { .. } =>
				StatusCode::SERVICE_UNAVAILABLE,
		};

		Self { retryable: err.is_retryable(), ..json_error(status, err.code(), err.to_string()) }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, retryable: self.retryable };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	let api = Router::new()
		.route("/v1/conversations/{id}/transcript", put(put_transcript))
		.route("/v1/conversations/{id}/activate", post(activate))
		.route("/v1/conversations/{id}/summary", post(summary))
		.route("/v1/conversations/{id}/timeline", post(timeline))
		.route("/v1/conversations/{id}/floor", get(floor))
		.route("/v1/conversations/{id}/events", post(events))
		.layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

	Router::new().route("/health", get(health)).merge(api).with_state(state)
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn put_transcript(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
	Json(payload): Json<TranscriptBody>,
) -> Result<Json<TranscriptResponse>, ApiError> {
	let messages = payload.messages.len();

	state.transcripts.replace(&conversation_id, payload.messages);

	tracing::debug!(conversation_id = %conversation_id, messages, "Transcript replaced.");

	Ok(Json(TranscriptResponse { conversation_id, messages }))
}

async fn activate(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
	Json(payload): Json<BookBody>,
) -> Result<Json<ActivateResponse>, ApiError> {
	let book = resolve_book(&state, payload.book)?;

	state.trigger.reset(&conversation_id);

	let enabled = state.service.activate_conversation(&book, &conversation_id).await;

	Ok(Json(ActivateResponse { conversation_id, enabled }))
}

async fn summary(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
	Json(payload): Json<RunBody>,
) -> Result<Json<SummaryReport>, ApiError> {
	let book = resolve_book(&state, payload.book)?;
	let request = SummaryRequest { book, conversation_id, range: payload.range };
	let report = state.service.run_summary(request).await?;

	Ok(Json(report))
}

async fn timeline(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
	Json(payload): Json<RunBody>,
) -> Result<Json<TimelineReport>, ApiError> {
	let book = resolve_book(&state, payload.book)?;
	let request = TimelineRequest { book, conversation_id, range: payload.range };
	let report = state.service.run_timeline_update(request).await?;

	Ok(Json(report))
}

async fn floor(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
	Query(query): Query<BookQuery>,
) -> Result<Json<FloorResponse>, ApiError> {
	let book = resolve_book(&state, query.book)?;
	let last_summarized_floor =
		state.service.try_last_summarized_floor(&book, &conversation_id).await?;

	Ok(Json(FloorResponse { conversation_id, last_summarized_floor }))
}

async fn events(
	State(state): State<AppState>,
	Path(conversation_id): Path<String>,
	Json(payload): Json<EventBody>,
) -> Result<Json<EventResponse>, ApiError> {
	let book = resolve_book(&state, payload.book)?;

	if let Some(messages) = payload.messages {
		state.transcripts.replace(&conversation_id, messages);
	}

	let decision = state.trigger.notify(&book, &conversation_id);

	Ok(Json(EventResponse { decision }))
}

async fn auth_middleware(
	State(state): State<AppState>,
	req: Request<Body>,
	next: Next,
) -> Response {
	if let Some(expected) = state.service.cfg.security.api_auth_token.as_deref()
		&& read_bearer_token(req.headers()) != Some(expected)
	{
		return json_error(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid Bearer token is required.",
		)
		.into_response();
	}

	next.run(req).await
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

/// Blank or missing book names fall back to `storage.default_book`.
fn resolve_book(state: &AppState, book: Option<String>) -> Result<String, ApiError> {
	let book = book
		.filter(|book| !book.trim().is_empty())
		.unwrap_or_else(|| state.service.cfg.storage.default_book.clone());

	lore_storage::validate_book_name(&book)
		.map_err(|err| json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", err.to_string()))?;

	Ok(book)
}
