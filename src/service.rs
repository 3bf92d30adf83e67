use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::model::{AdRecord, Query};
use crate::pipeline::Aggregator;
use crate::store;

const ERROR_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("an aggregation run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// `{active, count, results}` as served to the status view.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub active: bool,
    pub count: usize,
    pub results: Vec<AdRecord>,
}

/// Outcome of one triggered run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSummary {
    Completed { count: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl RunSummary {
    /// Message for the notification sender. Nothing to send for an empty success.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            RunSummary::Completed { count: 0 } => None,
            RunSummary::Completed { count } => Some(Notification {
                title: "Scraping Terminé".to_string(),
                body: format!("J'ai trouvé {} minibus pour vous !", count),
            }),
            RunSummary::Failed { message } => Some(Notification {
                title: "Erreur Scraping".to_string(),
                body: format!(
                    "Une erreur est survenue : {}",
                    message.chars().take(ERROR_PREVIEW_CHARS).collect::<String>()
                ),
            }),
        }
    }
}

type Builder = Box<dyn Fn(&Settings) -> Result<Aggregator> + Send + Sync>;

/// Serializes runs and keeps the last result set for the status view.
pub struct AggregationService {
    settings: Settings,
    build: Builder,
    state: Mutex<RunState>,
    results: Mutex<Vec<AdRecord>>,
}

impl AggregationService {
    pub fn new(settings: Settings) -> Self {
        Self::with_builder(settings, Aggregator::from_settings)
    }

    pub fn with_builder<F>(settings: Settings, build: F) -> Self
    where
        F: Fn(&Settings) -> Result<Aggregator> + Send + Sync + 'static,
    {
        Self {
            settings,
            build: Box::new(build),
            state: Mutex::new(RunState::Idle),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Run one aggregation unless another is in progress.
    pub async fn trigger(&self, query: &Query) -> Result<RunSummary, ServiceError> {
        let guard = RunGuard::acquire(&self.state)?;
        info!("Aggregation started (keyword '{}')", query.keyword);

        let aggregator = match (self.build)(&self.settings) {
            Ok(a) => a,
            Err(e) => {
                error!("Aggregation setup failed: {:#}", e);
                guard.finish(RunState::Failed);
                return Ok(RunSummary::Failed {
                    message: format!("{:#}", e),
                });
            }
        };

        let output = aggregator.run(query).await;
        let count = output.records.len();
        *lock(&self.results) = output.records;

        let summary = match output.error {
            Some(message) => {
                guard.finish(RunState::Failed);
                RunSummary::Failed { message }
            }
            None => {
                guard.finish(RunState::Completed);
                RunSummary::Completed { count }
            }
        };
        Ok(summary)
    }

    /// Current state, reloading the last persisted run when nothing is in memory.
    pub fn status(&self) -> StatusSnapshot {
        let active = self.state() == RunState::Running;
        let mut results = lock(&self.results);
        if results.is_empty() && !active {
            match store::load_records(&self.settings.output_path) {
                Ok(loaded) => *results = loaded,
                Err(e) => warn!(
                    "Could not reload {}: {}",
                    self.settings.output_path.display(),
                    e
                ),
            }
        }
        StatusSnapshot {
            active,
            count: results.len(),
            results: results.clone(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the `Running` state; a run dropped mid-way ends up `Failed`.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    done: bool,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a Mutex<RunState>) -> Result<Self, ServiceError> {
        let mut current = lock(state);
        if *current == RunState::Running {
            return Err(ServiceError::AlreadyRunning);
        }
        *current = RunState::Running;
        Ok(Self { state, done: false })
    }

    fn finish(mut self, outcome: RunState) {
        *lock(self.state) = outcome;
        self.done = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            *lock(self.state) = RunState::Failed;
        }
    }
}
