//! Pipeline orchestrator: ties the site scraper phases together.
//!
//! ## Run states
//!
//! `Validating → Searching → Paginating → Extracting → Done`, or `Failed`.
//!
//!   1. Check the search page still has its search form.
//!   2. Search every unique non-blank name; collect found names, extra result
//!      pages and detail links.
//!   3. Expand the extra result pages into more detail links.
//!   4. Scrape every distinct detail link into one table row.
//!
//! Each phase is a barrier: the next one starts only after every task of the
//! current one has finished. All phases share one worker pool.
//! A run either returns the full table and flags or nothing at all.

use crate::config::AppConfig;
use crate::mapping::FieldMapping;
use crate::models::{DetailRef, PaginationRef, ResultTable, RunOutput, SearchOutcome};
use crate::notify::Notifier;
use crate::scraper::http_client::HttpClient;
use crate::scraper::retry::RetryPolicy;
use crate::scraper::{ScrapeError, SiteScraper};
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    Searching,
    Paginating,
    Extracting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Validating => "validating site",
            RunState::Searching => "searching",
            RunState::Paginating => "expanding result pages",
            RunState::Extracting => "extracting records",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Append-only collection shared by the tasks of one phase.
struct Accumulator<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Accumulator<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Accumulator<T> {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    fn push(&self, item: T) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(item);
    }

    fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend(items);
    }

    fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct Pipeline {
    scraper: Arc<SiteScraper>,
    pool: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(scraper: SiteScraper, pool_size: usize) -> Self {
        Self {
            scraper: Arc::new(scraper),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    pub fn from_config(config: &AppConfig, mapping: FieldMapping) -> Result<Self> {
        let client = HttpClient::new(&config.scraper)?;
        let retry = RetryPolicy::new(config.scraper.retry_attempts, config.scraper.retry_delay());
        let scraper = SiteScraper::new(
            Arc::new(client),
            retry,
            &config.scraper.search_url,
            config.scraper.search_form.clone(),
            mapping,
        )?;
        Ok(Self::new(scraper, config.pipeline.pool_size))
    }

    pub fn scraper(&self) -> &SiteScraper {
        &self.scraper
    }

    /// Run all phases. On failure the notifier is told once and the caller gets
    /// `ScrapeError::Handled`; if the notifier itself fails, the original error.
    pub async fn run(&self, names: &[String], notifier: &dyn Notifier) -> Result<RunOutput, ScrapeError> {
        let mut state = RunState::Validating;

        match self.execute(names, &mut state).await {
            Ok(output) => Ok(output),
            Err(e) => {
                let reason = format!("scraping failed while {}: {}", state, e);
                error!("{}", reason);
                enter(&mut state, RunState::Failed);

                match notifier.notify_failure(&reason).await {
                    Ok(()) => Err(ScrapeError::Handled { reason }),
                    Err(notify_err) => {
                        error!("Could not report failure: {:#}", notify_err);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn execute(&self, names: &[String], state: &mut RunState) -> Result<RunOutput, ScrapeError> {
        // ── 1. Validate ───────────────────────────────────────────────────────
        enter(state, RunState::Validating);
        self.scraper.validate().await?;

        // ── 2. Search ─────────────────────────────────────────────────────────
        enter(state, RunState::Searching);
        let unique = unique_names(names);
        info!("{} unique search names ({} given)", unique.len(), names.len());

        let found: Accumulator<String> = Accumulator::new();
        let pages: Accumulator<PaginationRef> = Accumulator::new();
        let details: Accumulator<DetailRef> = Accumulator::new();

        {
            let (found, pages, details) = (found.clone(), pages.clone(), details.clone());
            self.run_phase(unique, move |scraper, name: String| {
                let (found, pages, details) = (found.clone(), pages.clone(), details.clone());
                async move {
                    match scraper.search_one(&name).await? {
                        SearchOutcome::Empty => debug!("{:?}: no results", name),
                        SearchOutcome::Direct(refs) => {
                            debug!("{:?}: {} records", name, refs.len());
                            found.push(name);
                            details.extend(refs);
                        }
                        SearchOutcome::Paginated(refs) => {
                            debug!("{:?}: {} result pages", name, refs.len());
                            found.push(name);
                            pages.extend(refs);
                        }
                    }
                    Ok::<(), ScrapeError>(())
                }
            })
            .await?;
        }

        // ── 3. Paginate ───────────────────────────────────────────────────────
        enter(state, RunState::Paginating);
        let pages = pages.take();
        info!("{} result pages to expand", pages.len());
        {
            let details = details.clone();
            self.run_phase(pages, move |scraper, page: PaginationRef| {
                let details = details.clone();
                async move {
                    details.extend(scraper.expand_page(&page).await?);
                    Ok::<(), ScrapeError>(())
                }
            })
            .await?;
        }

        // ── 4. Extract ────────────────────────────────────────────────────────
        enter(state, RunState::Extracting);
        let detail_refs = distinct_details(details.take());
        info!("{} detail pages to scrape", detail_refs.len());

        let records = Accumulator::new();
        {
            let records = records.clone();
            self.run_phase(detail_refs, move |scraper, detail: DetailRef| {
                let records = records.clone();
                async move {
                    let record = scraper.extract_form(&detail).await?;
                    debug!("Extracted {}", record.source_url);
                    records.push(record);
                    Ok::<(), ScrapeError>(())
                }
            })
            .await?;
        }

        // ── 5. Assemble ───────────────────────────────────────────────────────
        let table = ResultTable::with_rows(self.scraper.mapping().columns(), records.take());
        let found: HashSet<String> = found.take().into_iter().collect();
        let success = success_flags(names, &found);
        enter(state, RunState::Done);

        info!(
            "=== Done: {} names | {} found | {} records ===",
            names.len(),
            success.iter().filter(|f| **f).count(),
            table.len()
        );
        Ok(RunOutput { table, success })
    }

    /// Run one task per item on the shared pool and wait for all of them.
    /// The first failure ends the phase; unfinished siblings are dropped.
    async fn run_phase<T, F, Fut>(&self, items: Vec<T>, task: F) -> Result<(), ScrapeError>
    where
        T: Send + 'static,
        F: Fn(Arc<SiteScraper>, T) -> Fut,
        Fut: Future<Output = Result<(), ScrapeError>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for item in items {
            let pool = Arc::clone(&self.pool);
            let work = task(Arc::clone(&self.scraper), item);
            tasks.spawn(async move {
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|e| ScrapeError::Worker(e.to_string()))?;
                work.await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(ScrapeError::Worker(format!("task panicked: {}", e))),
            }
        }
        Ok(())
    }
}

fn enter(state: &mut RunState, next: RunState) {
    info!("=== {} ===", next);
    *state = next;
}

/// Distinct trimmed non-blank names, first occurrence order.
/// Names differing only in surrounding whitespace send the same query.
pub fn unique_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(*n))
        .map(String::from)
        .collect()
}

fn distinct_details(refs: Vec<DetailRef>) -> Vec<DetailRef> {
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(r.url.clone())).collect()
}

/// One flag per input name, in input order. `found` holds trimmed names.
pub fn success_flags(names: &[String], found: &HashSet<String>) -> Vec<bool> {
    names
        .iter()
        .map(|n| n.trim())
        .map(|n| !n.is_empty() && found.contains(n))
        .collect()
}
