//! The resolution tracker: polls venues for the outcome of open questions and
//! records it through the store's atomic resolve-and-transition.

use std::sync::Arc;

use augur_core::{
  question::{QuestionState, QuestionView},
  resolution::{NewResolution, ResolutionEvent, ResolveOutcome},
  source::{ResolutionStatus, SourceAdapter},
  store::ForecastStore,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
  sync::Semaphore,
  task::JoinSet,
  time::{Instant, timeout_at},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  config::{PollPolicy, ResolveConfig, deadline_from_now, hours_delta},
  error::ValidationError,
  registry::SourceRegistry,
};

#[derive(Debug, Clone, Serialize)]
pub struct PollError {
  pub source:      String,
  pub question_id: Uuid,
  pub message:     String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
  pub polled:       usize,
  pub resolved:     usize,
  pub corrected:    usize,
  pub cancelled:    usize,
  pub invalidated:  usize,
  pub unchanged:    usize,
  pub still_open:   usize,
  /// The venue reported a state the question cannot move to.
  pub rejected:     usize,
  /// Open questions not polled because their resolution date is ahead.
  pub not_due:      usize,
  /// Questions whose source is not in the registry.
  pub unregistered: usize,
  /// Polls cut off by the cycle deadline; retried next cycle.
  pub deadline_hit: usize,
  pub errors:       Vec<PollError>,
}

enum PollResult {
  Applied(ResolveOutcome),
  StillOpen,
  Ignored,
  Failed(String),
  DeadlineHit,
}

pub struct ResolutionTracker<S> {
  store:    Arc<S>,
  registry: Arc<SourceRegistry>,
  config:   ResolveConfig,
}

impl<S> ResolutionTracker<S>
where
  S: ForecastStore + 'static,
{
  pub fn new(store: Arc<S>, registry: Arc<SourceRegistry>, config: ResolveConfig) -> Self {
    Self { store, registry, config }
  }

  /// Run one resolution cycle. Only fails if the question lists cannot be
  /// read; per-question failures are logged and counted.
  pub async fn run(&self) -> Result<ResolveReport> {
    let deadline = deadline_from_now(self.config.cycle_timeout());
    let now = Utc::now();
    let today = now.date_naive();
    let mut report = ResolveReport::default();

    // (view, whether this is a correction re-poll of a resolved question)
    let mut targets: Vec<(QuestionView, bool)> = Vec::new();
    for view in self.store.open_questions().await.map_err(Error::store)? {
      if self.config.policy == PollPolicy::DueOnly && !view.latest.content.is_due(today) {
        report.not_due += 1;
        continue;
      }
      targets.push((view, false));
    }
    if let Some(hours) = self.config.correction_window_hours {
      let since = hours_delta(hours)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
      for rq in self.store.resolved_questions().await.map_err(Error::store)? {
        let recent = rq.active().is_some_and(|r| r.recorded_at >= since);
        if recent && rq.view.question.state == QuestionState::Resolved {
          targets.push((rq.view, true));
        }
      }
    }

    let permits = Arc::new(Semaphore::new(self.config.max_concurrent_polls.max(1)));
    let mut tasks = JoinSet::new();
    for (view, recheck) in targets {
      let Some(adapter) = self.registry.get(&view.question.source) else {
        report.unregistered += 1;
        continue;
      };
      let adapter = Arc::clone(adapter);
      let store = Arc::clone(&self.store);
      let permits = Arc::clone(&permits);
      tasks.spawn(async move {
        let result = match timeout_at(deadline, permits.acquire_owned()).await {
          Ok(_permit) => {
            poll_one(store.as_ref(), adapter.as_ref(), &view, recheck, deadline).await
          }
          Err(_) => PollResult::DeadlineHit,
        };
        (view, result)
      });
    }

    loop {
      let next = timeout_at(deadline, tasks.join_next()).await;
      let joined = match next {
        Ok(Some(joined)) => joined,
        Ok(None) => break,
        Err(_) => {
          warn!(remaining = tasks.len(), "cycle deadline reached; abandoning outstanding polls");
          report.deadline_hit += tasks.len();
          tasks.abort_all();
          break;
        }
      };
      let (view, result) = match joined {
        Ok(v) => v,
        Err(e) => {
          warn!(error = %e, "resolution poll task panicked");
          continue;
        }
      };
      if matches!(result, PollResult::DeadlineHit) {
        report.deadline_hit += 1;
        continue;
      }
      report.polled += 1;
      match result {
        PollResult::Applied(outcome) => match outcome {
          ResolveOutcome::Resolved(_) => report.resolved += 1,
          ResolveOutcome::Corrected(_) => report.corrected += 1,
          ResolveOutcome::Closed(QuestionState::Cancelled) => report.cancelled += 1,
          ResolveOutcome::Closed(_) => report.invalidated += 1,
          ResolveOutcome::Unchanged => report.unchanged += 1,
          ResolveOutcome::Rejected { .. } => report.rejected += 1,
        },
        PollResult::StillOpen => report.still_open += 1,
        PollResult::Ignored => report.unchanged += 1,
        PollResult::Failed(message) => report.errors.push(PollError {
          source: view.question.source,
          question_id: view.question.question_id,
          message,
        }),
        PollResult::DeadlineHit => {}
      }
    }

    info!(
      polled = report.polled,
      resolved = report.resolved,
      corrected = report.corrected,
      cancelled = report.cancelled,
      invalidated = report.invalidated,
      still_open = report.still_open,
      deadline_hit = report.deadline_hit,
      errors = report.errors.len(),
      "resolution cycle finished"
    );
    Ok(report)
  }
}

/// Map a venue status to a resolution event. Re-polls of resolved questions
/// only act on a (possibly corrected) outcome.
fn event_for(
  status: ResolutionStatus,
  recheck: bool,
) -> Result<Option<ResolutionEvent>, ValidationError> {
  let event = match status {
    ResolutionStatus::Resolved { outcome, resolved_at, confirmed } => {
      if !(outcome.is_finite() && (0.0..=1.0).contains(&outcome)) {
        return Err(ValidationError::OutcomeOutOfRange(outcome));
      }
      ResolutionEvent::Resolved(NewResolution {
        outcome,
        resolved_at: resolved_at.unwrap_or_else(Utc::now),
        source_confirmed: confirmed,
      })
    }
    _ if recheck => return Ok(None),
    ResolutionStatus::StillOpen => return Ok(None),
    ResolutionStatus::Cancelled { reason } => ResolutionEvent::Cancelled { reason },
    ResolutionStatus::NotFound => ResolutionEvent::Invalid {
      reason: Some("question no longer listed by source".into()),
    },
  };
  Ok(Some(event))
}

async fn poll_one<S: ForecastStore>(
  store: &S,
  adapter: &dyn SourceAdapter,
  view: &QuestionView,
  recheck: bool,
  deadline: Instant,
) -> PollResult {
  let source = adapter.name();
  let question_id = view.question.question_id;

  let fetch = adapter.fetch_resolution(&view.question.source_question_id);
  let status = match timeout_at(deadline, fetch).await {
    Ok(Ok(status)) => status,
    Ok(Err(e)) => {
      warn!(source, %question_id, error = %e, "resolution fetch failed");
      return PollResult::Failed(e.to_string());
    }
    Err(_) => {
      warn!(source, %question_id, "resolution fetch hit the cycle deadline");
      return PollResult::DeadlineHit;
    }
  };
  let still_open = matches!(status, ResolutionStatus::StillOpen);

  let event = match event_for(status, recheck) {
    Ok(Some(event)) => event,
    Ok(None) if still_open && !recheck => return PollResult::StillOpen,
    Ok(None) => return PollResult::Ignored,
    Err(e) => {
      warn!(source, %question_id, error = %e, "invalid resolution from source");
      return PollResult::Failed(e.to_string());
    }
  };

  match store.resolve_question(question_id, event).await {
    Ok(ResolveOutcome::Rejected { current }) => {
      warn!(source, %question_id, %current, "resolution rejected; question already terminal");
      PollResult::Applied(ResolveOutcome::Rejected { current })
    }
    Ok(outcome) => PollResult::Applied(outcome),
    Err(e) => {
      warn!(source, %question_id, error = %e, "resolution not stored");
      PollResult::Failed(e.to_string())
    }
  }
}
