use std::{
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use serde::Serialize;
use tokio::time::Instant;

use crate::{LoreService, Result, RunKind, SummaryRequest, SummaryStatus, TimelineRequest};
use lore_domain::tokens::estimate_tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerDecision {
	Disabled,
	Scheduled,
	Coalesced,
	/// No async runtime was available to schedule the check.
	Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
	Disabled,
	Coalesced,
	Schedule { delay: Duration, epoch: u64 },
}

/// Unsummarized work past the floor marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWork {
	pub messages: usize,
	pub tokens: u32,
}

/// Pure bookkeeping behind [`AutoTrigger`]. Time is passed in so tests can drive it.
#[derive(Debug)]
pub struct TriggerGate {
	cfg: lore_config::Trigger,
	conversation: Option<String>,
	epoch: u64,
	pending: bool,
	last_check: Option<Instant>,
}
impl TriggerGate {
	pub fn new(cfg: lore_config::Trigger) -> Self {
		Self { cfg, conversation: None, epoch: 0, pending: false, last_check: None }
	}

	/// Registers a message event. Switching conversations resets all state first.
	pub fn observe(&mut self, conversation_id: &str, now: Instant) -> Observation {
		if !self.cfg.enabled {
			return Observation::Disabled;
		}
		if self.conversation.as_deref() != Some(conversation_id) {
			self.reset(conversation_id);
		}
		if self.pending {
			return Observation::Coalesced;
		}

		let mut delay = Duration::from_millis(self.cfg.debounce_ms);

		if let Some(last) = self.last_check {
			let spacing = Duration::from_millis(self.cfg.min_interval_ms)
				.saturating_sub(now.saturating_duration_since(last));

			delay = delay.max(spacing);
		}

		self.pending = true;

		Observation::Schedule { delay, epoch: self.epoch }
	}

	/// Drops any pending check. Checks scheduled before the reset are abandoned when they wake.
	pub fn reset(&mut self, conversation_id: &str) {
		self.conversation = Some(conversation_id.to_string());
		self.epoch += 1;
		self.pending = false;
		self.last_check = None;
	}

	/// Claims a woken check. `false` means it belongs to an older epoch or conversation.
	pub fn begin_check(&mut self, conversation_id: &str, epoch: u64, now: Instant) -> bool {
		if epoch != self.epoch || self.conversation.as_deref() != Some(conversation_id) {
			return false;
		}

		self.pending = false;
		self.last_check = Some(now);

		true
	}

	pub fn should_fire(&self, work: &PendingWork) -> bool {
		work.messages >= self.cfg.message_threshold as usize
			|| work.tokens >= self.cfg.token_threshold
	}
}

#[derive(Clone)]
pub struct AutoTrigger {
	service: Arc<LoreService>,
	gate: Arc<Mutex<TriggerGate>>,
}
impl AutoTrigger {
	pub fn new(service: Arc<LoreService>) -> Self {
		let gate = TriggerGate::new(service.cfg.trigger.clone());

		Self { service, gate: Arc::new(Mutex::new(gate)) }
	}

	/// Called on every new message. The threshold check itself runs later on a spawned task.
	pub fn notify(&self, book: &str, conversation_id: &str) -> TriggerDecision {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			tracing::warn!(conversation_id, "No runtime available for the auto trigger.");

			return TriggerDecision::Unavailable;
		};
		let observation = lock(&self.gate).observe(conversation_id, Instant::now());

		match observation {
			Observation::Disabled => TriggerDecision::Disabled,
			Observation::Coalesced => TriggerDecision::Coalesced,
			Observation::Schedule { delay, epoch } => {
				tracing::debug!(
					conversation_id,
					delay_ms = delay.as_millis() as u64,
					epoch,
					"Trigger check scheduled."
				);

				let check = Check {
					service: self.service.clone(),
					gate: self.gate.clone(),
					book: book.to_string(),
					conversation_id: conversation_id.to_string(),
					epoch,
				};

				handle.spawn(check.run(delay));

				TriggerDecision::Scheduled
			},
		}
	}

	/// Forgets pending checks, e.g. when the host switches conversations.
	pub fn reset(&self, conversation_id: &str) {
		lock(&self.gate).reset(conversation_id);
	}
}

struct Check {
	service: Arc<LoreService>,
	gate: Arc<Mutex<TriggerGate>>,
	book: String,
	conversation_id: String,
	epoch: u64,
}
impl Check {
	async fn run(self, delay: Duration) {
		tokio::time::sleep(delay).await;

		let conversation_id = self.conversation_id.as_str();

		if !lock(&self.gate).begin_check(conversation_id, self.epoch, Instant::now()) {
			tracing::debug!(conversation_id, "Stale trigger check abandoned.");

			return;
		}
		if let Some(active) = self.service.session.active_conversation()
			&& active != conversation_id
		{
			tracing::debug!(conversation_id, active = %active, "Conversation no longer active.");

			return;
		}
		if self.service.session.is_running(RunKind::Summary, conversation_id) {
			tracing::debug!(conversation_id, "Summary in flight. Check skipped.");

			return;
		}

		let work = match self.service.pending_work(&self.book, conversation_id).await {
			Ok(work) => work,
			Err(err) => {
				tracing::warn!(error = %err, conversation_id, "Trigger check failed.");

				return;
			},
		};

		if !lock(&self.gate).should_fire(&work) {
			tracing::debug!(
				conversation_id,
				messages = work.messages,
				tokens = work.tokens,
				"Below trigger thresholds."
			);

			return;
		}

		tracing::info!(
			conversation_id,
			messages = work.messages,
			tokens = work.tokens,
			"Auto trigger firing."
		);

		let request = SummaryRequest {
			book: self.book.clone(),
			conversation_id: self.conversation_id.clone(),
			range: None,
		};
		let range = match self.service.run_summary(request).await {
			Ok(report) if report.status == SummaryStatus::Completed => report.range,
			Ok(_) => None,
			Err(err) => {
				tracing::warn!(error = %err, conversation_id, "Automatic summary failed.");

				None
			},
		};

		if let Some(range) = range {
			let request = TimelineRequest {
				book: self.book.clone(),
				conversation_id: self.conversation_id.clone(),
				range: Some(range),
			};

			if let Err(err) = self.service.run_timeline_update(request).await {
				tracing::warn!(error = %err, conversation_id, "Automatic timeline update failed.");
			}
		}
	}
}

impl LoreService {
	/// Visible messages past the floor marker and their token estimate. The host's own context
	/// count replaces the estimate when it offers one.
	pub async fn pending_work(&self, book: &str, conversation_id: &str) -> Result<PendingWork> {
		let last = self.try_last_summarized_floor(book, conversation_id).await?;
		let records = self.read_transcript(conversation_id).await?;
		let fresh = records.iter().filter(|record| !record.hidden && record.index > last);
		let mut work = PendingWork::default();

		for record in fresh {
			work.messages += 1;
			work.tokens = work.tokens.saturating_add(estimate_tokens(&record.text));
		}

		if let Some(tokens) = self.host.context_tokens(conversation_id) {
			work.tokens = tokens;
		}

		Ok(work)
	}
}

fn lock(gate: &Mutex<TriggerGate>) -> MutexGuard<'_, TriggerGate> {
	gate.lock().unwrap_or_else(|err| err.into_inner())
}
