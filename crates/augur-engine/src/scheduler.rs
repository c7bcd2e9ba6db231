//! The forecast scheduler.
//!
//! At the start of a cycle the scheduler reads every open question and plans
//! one job per (question, forecaster) pair that has no recent forecast. Jobs
//! are queued on one channel per provider and drained by that provider's
//! bounded worker pool. All workers of a provider share its rate limiter and
//! circuit breaker.
//!
//! Failures never escape a job: an exhausted job leaves a
//! [`augur_core::forecast::ForecastFailure`] row and a report entry, and the
//! batch carries on.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

use augur_core::{
  forecast::{ForecastErrorKind, NewForecast, NewForecastFailure},
  forecaster::{ForecastError, ForecastRequest, Forecaster, Generation},
  question::QuestionView,
  store::ForecastStore,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::{
  sync::{Mutex, mpsc},
  task::JoinSet,
  time::{Instant, sleep, timeout, timeout_at},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  backoff::Backoff,
  breaker::CircuitBreaker,
  config::{ClampPolicy, ForecastConfig, deadline_from_now},
  limiter::RateLimiter,
};

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
  Forecast {
    forecast_id: Uuid,
    probability: f64,
    retry_count: u32,
    clamped:     bool,
  },
  /// Attempts exhausted or a non-retryable error; a failure row was written.
  Failed {
    kind:     ForecastErrorKind,
    attempts: u32,
    message:  String,
  },
  /// The store refused the forecast, e.g. the question closed mid-cycle.
  Rejected { message: String },
  SkippedOpenCircuit,
  SkippedDeadline,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
  pub question_id:   Uuid,
  pub forecaster_id: String,
  pub provider:      String,
  pub status:        JobStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ForecastCycleReport {
  pub open_questions:   usize,
  /// Open questions skipped because their resolution date has passed.
  pub past_due_skipped: usize,
  /// Pairs skipped because a forecast newer than the refresh window exists.
  pub fresh:            usize,
  pub jobs:             Vec<JobReport>,
}

impl ForecastCycleReport {
  fn count(&self, f: impl Fn(&JobStatus) -> bool) -> usize {
    self.jobs.iter().filter(|j| f(&j.status)).count()
  }

  pub fn succeeded(&self) -> usize {
    self.count(|s| matches!(s, JobStatus::Forecast { .. }))
  }

  pub fn failed(&self) -> usize { self.count(|s| matches!(s, JobStatus::Failed { .. })) }

  pub fn rejected(&self) -> usize { self.count(|s| matches!(s, JobStatus::Rejected { .. })) }

  pub fn skipped_open_circuit(&self) -> usize {
    self.count(|s| matches!(s, JobStatus::SkippedOpenCircuit))
  }

  pub fn skipped_deadline(&self) -> usize {
    self.count(|s| matches!(s, JobStatus::SkippedDeadline))
  }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct Job {
  view:       Arc<QuestionView>,
  forecaster: Arc<dyn Forecaster>,
}

pub struct ForecastScheduler<S> {
  store:       Arc<S>,
  forecasters: Vec<Arc<dyn Forecaster>>,
  config:      Arc<ForecastConfig>,
}

impl<S> ForecastScheduler<S>
where
  S: ForecastStore + 'static,
{
  /// Fails with [`Error::DuplicateForecaster`] if two forecasters share an id.
  pub fn new(
    store: Arc<S>,
    forecasters: Vec<Arc<dyn Forecaster>>,
    config: ForecastConfig,
  ) -> Result<Self> {
    let mut seen = HashSet::new();
    for f in &forecasters {
      if !seen.insert(f.id().to_owned()) {
        return Err(Error::DuplicateForecaster(f.id().to_owned()));
      }
    }
    Ok(Self { store, forecasters, config: Arc::new(config) })
  }

  /// Run one forecast cycle. Only fails if the open questions cannot be read.
  pub async fn run(&self) -> Result<ForecastCycleReport> {
    let deadline = deadline_from_now(self.config.cycle_timeout());
    let now = Utc::now();
    let today = now.date_naive();

    let stale_before = self
      .config
      .refresh_after()
      .and_then(|window| now.checked_sub_signed(window))
      .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let views = self.store.open_questions().await.map_err(Error::store)?;
    let mut report = ForecastCycleReport { open_questions: views.len(), ..Default::default() };
    let mut queues: BTreeMap<String, Vec<Job>> = BTreeMap::new();

    for view in views {
      if self.config.skip_past_due
        && view.latest.content.resolution_date.is_some_and(|d| d < today)
      {
        report.past_due_skipped += 1;
        continue;
      }
      let question_id = view.question.question_id;
      let latest = match self.latest_forecasts(question_id).await {
        Ok(latest) => latest,
        Err(e) => {
          warn!(%question_id, error = %e, "could not read forecast history; skipping question");
          continue;
        }
      };

      let view = Arc::new(view);
      for forecaster in &self.forecasters {
        if latest.get(forecaster.id()).is_some_and(|as_of| *as_of > stale_before) {
          report.fresh += 1;
          continue;
        }
        queues
          .entry(forecaster.provider().to_owned())
          .or_default()
          .push(Job { view: Arc::clone(&view), forecaster: Arc::clone(forecaster) });
      }
    }

    let mut workers = JoinSet::new();
    for (provider, jobs) in queues {
      let settings = self.config.provider(&provider);
      let ctx = Arc::new(ProviderContext {
        store: Arc::clone(&self.store),
        config: Arc::clone(&self.config),
        limiter: RateLimiter::new(Duration::from_millis(settings.min_interval_ms)),
        breaker: CircuitBreaker::new(
          self.config.breaker_threshold,
          self.config.breaker_window(),
        ),
        provider,
        deadline,
        today,
      });

      let (tx, rx) = mpsc::channel(jobs.len().max(1));
      for job in jobs {
        // Capacity covers every job, so this never waits.
        if tx.send(job).await.is_err() {
          break;
        }
      }
      drop(tx);

      let shared_rx = Arc::new(Mutex::new(rx));
      for worker in 0..settings.max_concurrency.max(1) {
        let ctx = Arc::clone(&ctx);
        let rx = Arc::clone(&shared_rx);
        workers.spawn(async move { ctx.drain(rx, worker).await });
      }
    }

    while let Some(joined) = workers.join_next().await {
      match joined {
        Ok(mut jobs) => report.jobs.append(&mut jobs),
        Err(e) => warn!(error = %e, "forecast worker panicked"),
      }
    }

    info!(
      open = report.open_questions,
      planned = report.jobs.len(),
      fresh = report.fresh,
      succeeded = report.succeeded(),
      failed = report.failed(),
      skipped_open_circuit = report.skipped_open_circuit(),
      skipped_deadline = report.skipped_deadline(),
      "forecast cycle finished"
    );
    Ok(report)
  }

  /// Latest `as_of` per forecaster for one question.
  async fn latest_forecasts(&self, question_id: Uuid) -> Result<HashMap<String, DateTime<Utc>>> {
    let forecasts = self.store.forecasts_for(question_id).await.map_err(Error::store)?;
    let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
    for f in forecasts {
      let entry = latest.entry(f.forecaster_id).or_insert(f.as_of);
      if f.as_of > *entry {
        *entry = f.as_of;
      }
    }
    Ok(latest)
  }
}

// ─── Workers ─────────────────────────────────────────────────────────────────

/// Everything the workers of one provider share for one cycle.
struct ProviderContext<S> {
  store:    Arc<S>,
  config:   Arc<ForecastConfig>,
  provider: String,
  limiter:  RateLimiter,
  breaker:  CircuitBreaker,
  deadline: Instant,
  today:    NaiveDate,
}

impl<S> ProviderContext<S>
where
  S: ForecastStore + 'static,
{
  async fn drain(&self, rx: Arc<Mutex<mpsc::Receiver<Job>>>, worker: usize) -> Vec<JobReport> {
    let mut out = Vec::new();
    loop {
      let next = { rx.lock().await.recv().await };
      let Some(job) = next else {
        break;
      };
      let status = if Instant::now() >= self.deadline {
        JobStatus::SkippedDeadline
      } else if self.breaker.is_open() {
        JobStatus::SkippedOpenCircuit
      } else {
        self.run_job(&job).await
      };
      debug!(provider = %self.provider, worker, forecaster = job.forecaster.id(), ?status, "job done");
      out.push(JobReport {
        question_id: job.view.question.question_id,
        forecaster_id: job.forecaster.id().to_owned(),
        provider: self.provider.clone(),
        status,
      });
    }
    out
  }

  async fn run_job(&self, job: &Job) -> JobStatus {
    let request = ForecastRequest::from_view(
      &job.view,
      job.forecaster.model(),
      self.today,
      self.config.request_timeout(),
    );
    let mut backoff = Backoff::new(self.config.initial_backoff(), self.config.max_backoff());
    let max_attempts = self.config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
      attempt += 1;
      if self.breaker.is_open() {
        return JobStatus::SkippedOpenCircuit;
      }

      let attempted = timeout_at(self.deadline, async {
        self.limiter.acquire().await;
        let started = Instant::now();
        let result = timeout(request.timeout, job.forecaster.generate(&request)).await;
        (started.elapsed(), result)
      })
      .await;
      let Ok((elapsed, result)) = attempted else {
        return JobStatus::SkippedDeadline;
      };

      let outcome = result
        .unwrap_or(Err(ForecastError::Timeout))
        .and_then(|g| self.validate(g));
      let error = match outcome {
        Ok((generation, probability, clamped)) => {
          return self.commit(job, generation, probability, clamped, elapsed, attempt - 1).await;
        }
        Err(e) => e,
      };

      if error.counts_against_provider() && self.breaker.record_failure() {
        warn!(provider = %self.provider, "circuit breaker opened; skipping provider for the rest of the cycle");
      }
      if !error.is_retryable() || attempt >= max_attempts {
        return self.record_failure(job, &error, attempt).await;
      }

      let hint = match &error {
        ForecastError::RateLimited { retry_after } => *retry_after,
        _ => None,
      };
      let delay = backoff.next_delay(hint);
      debug!(
        provider = %self.provider,
        forecaster = job.forecaster.id(),
        question_id = %request.question_id,
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "retrying forecast"
      );
      if timeout_at(self.deadline, sleep(delay)).await.is_err() {
        return JobStatus::SkippedDeadline;
      }
    }
  }

  /// Apply the clamp policy. Returns the probability to store and whether it
  /// was clamped.
  fn validate(&self, g: Generation) -> Result<(Generation, f64, bool), ForecastError> {
    let p = g.probability;
    if !p.is_finite() {
      return Err(ForecastError::InvalidOutput(format!("non-finite probability {p}")));
    }
    if (0.0..=1.0).contains(&p) {
      return Ok((g, p, false));
    }
    match self.config.clamp_policy {
      ClampPolicy::Reject => {
        Err(ForecastError::InvalidOutput(format!("probability {p} outside [0, 1]")))
      }
      ClampPolicy::Clamp => Ok((g, p.clamp(0.0, 1.0), true)),
    }
  }

  async fn commit(
    &self,
    job: &Job,
    generation: Generation,
    probability: f64,
    clamped: bool,
    elapsed: Duration,
    retry_count: u32,
  ) -> JobStatus {
    let question_id = job.view.question.question_id;
    let input = NewForecast {
      question_id,
      forecaster_id: job.forecaster.id().to_owned(),
      as_of: Utc::now(),
      probability,
      raw_output: generation.raw_output,
      reasoning: generation.reasoning,
      latency_ms: elapsed.as_millis() as u64,
      retry_count,
      clamped,
    };
    match self.store.append_forecast(input).await {
      Ok(f) => JobStatus::Forecast {
        forecast_id: f.forecast_id,
        probability: f.probability,
        retry_count: f.retry_count,
        clamped: f.clamped,
      },
      Err(e) => {
        warn!(%question_id, forecaster = job.forecaster.id(), error = %e, "forecast not stored");
        JobStatus::Rejected { message: e.to_string() }
      }
    }
  }

  async fn record_failure(&self, job: &Job, error: &ForecastError, attempts: u32) -> JobStatus {
    let question_id = job.view.question.question_id;
    warn!(
      %question_id,
      forecaster = job.forecaster.id(),
      attempts,
      error = %error,
      "forecast failed"
    );
    let input = NewForecastFailure {
      question_id,
      forecaster_id: job.forecaster.id().to_owned(),
      kind: error.kind(),
      message: error.to_string(),
      attempts,
    };
    if let Err(e) = self.store.record_forecast_failure(input).await {
      warn!(%question_id, error = %e, "could not record forecast failure");
    }
    JobStatus::Failed { kind: error.kind(), attempts, message: error.to_string() }
  }
}
