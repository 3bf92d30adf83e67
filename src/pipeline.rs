use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::http::HttpClient;
use crate::model::{AdRecord, Query};
use crate::sources::{self, SourceAdapter};
use crate::store;

/// What a run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final ordered collection, also returned when persisting it failed.
    pub records: Vec<AdRecord>,
    pub output_path: PathBuf,
    /// Run-level failure (client setup, writer) for the caller to report.
    pub error: Option<String>,
}

/// Runs a fixed list of adapters in order and persists what they find.
pub struct Aggregator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    settings: Settings,
}

impl Aggregator {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, settings: Settings) -> Self {
        Self { adapters, settings }
    }

    /// The five marketplaces over a fresh HTTP client.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = HttpClient::new(settings)?;
        let adapters = sources::default_adapters(&client, settings.max_candidates);
        Ok(Self::new(adapters, settings.clone()))
    }

    /// List, detail, merge and sort. Individual source failures only shrink the result.
    pub async fn collect(&self, query: &Query) -> Vec<AdRecord> {
        let mut records = Vec::new();

        for adapter in &self.adapters {
            let site = adapter.site();
            let t0 = Instant::now();
            let candidates = adapter.list(query).await;
            if candidates.is_empty() {
                warn!("{}: no candidates", site);
                continue;
            }

            let pb = ProgressBar::new(candidates.len() as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{prefix:>18} [{bar:30}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb.set_prefix(site.name());

            let mut kept = 0usize;
            for (i, candidate) in candidates.iter().enumerate() {
                if i > 0 {
                    let pause = self.settings.detail_pause();
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                if let Some(record) = adapter.detail(candidate).await {
                    kept += 1;
                    records.push(record);
                }
                pb.inc(1);
            }
            pb.finish_and_clear();

            info!(
                "{}: kept {} of {} candidates in {:.1}s",
                site,
                kept,
                candidates.len(),
                t0.elapsed().as_secs_f64()
            );
        }

        let mut records = finalize(records);
        sort_records(&mut records);
        records
    }

    /// One full run: collect, then overwrite the record file.
    pub async fn run(&self, query: &Query) -> RunOutput {
        let records = self.collect(query).await;
        let output_path = self.settings.output_path.clone();
        let error = match store::write_records(&output_path, &records) {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to persist {}: {}", output_path.display(), e);
                Some(e.to_string())
            }
        };
        info!("Aggregation finished with {} records", records.len());
        RunOutput {
            records,
            output_path,
            error,
        }
    }
}

/// Entry point for the surrounding service. Never fails: setup problems come back in
/// `RunOutput::error` with an empty collection.
pub async fn run_aggregation(query: &Query, settings: &Settings) -> RunOutput {
    match Aggregator::from_settings(settings) {
        Ok(aggregator) => aggregator.run(query).await,
        Err(e) => {
            error!("Aggregation setup failed: {:#}", e);
            RunOutput {
                records: Vec::new(),
                output_path: settings.output_path.clone(),
                error: Some(format!("{:#}", e)),
            }
        }
    }
}

/// Drop records without a usable link, then keep the first record per link.
fn finalize(records: Vec<AdRecord>) -> Vec<AdRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            if !r.has_absolute_link() {
                warn!("{}: dropping record without absolute link ({:?})", r.site, r.link);
                return false;
            }
            seen.insert(r.link.clone())
        })
        .collect()
}

/// Descending on (raw date text, price magnitude). Stable, so ties keep source order.
///
/// The date key is compared as text: `31-01-2024` ranks above `01-02-2024`.
pub fn sort_records(records: &mut [AdRecord]) {
    records.sort_by_cached_key(|r| Reverse((r.published.clone(), r.price_value())));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{CandidateRef, Site};

    fn ad(site: Site, link: &str, date: &str, price: &str) -> AdRecord {
        AdRecord {
            site,
            model: "Minibus".into(),
            price: price.into(),
            contact: String::new(),
            link: link.into(),
            phone: "N/A".into(),
            published: date.into(),
            image: String::new(),
        }
    }

    /// Serves `count` candidates and resolves each one unless `detail_fails`.
    struct Stub {
        site: Site,
        count: usize,
        detail_fails: bool,
        detail_calls: Arc<AtomicUsize>,
    }

    impl Stub {
        fn new(site: Site, count: usize, detail_fails: bool) -> Self {
            Self {
                site,
                count,
                detail_fails,
                detail_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for Stub {
        fn site(&self) -> Site {
            self.site
        }

        async fn list(&self, _query: &Query) -> Vec<CandidateRef> {
            (0..self.count)
                .map(|i| CandidateRef::new(format!("{}/ad/{}", self.site.origin(), i), ""))
                .collect()
        }

        async fn detail(&self, candidate: &CandidateRef) -> Option<AdRecord> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.detail_fails {
                return None;
            }
            Some(ad(self.site, &candidate.url, "Today", "100 000 DH"))
        }
    }

    fn quiet_settings(dir: &std::path::Path) -> Settings {
        Settings {
            output_path: dir.join("out.csv"),
            pause_min_ms: 0,
            pause_max_ms: 0,
            ..Settings::default()
        }
    }

    fn query() -> Query {
        Query {
            keyword: "minibus".into(),
            category_url: "https://www.avito.ma/fr/maroc/fourgon_et_minibus".into(),
        }
    }

    #[tokio::test]
    async fn failing_sources_do_not_abort_run() {
        let dir = tempfile::tempdir().unwrap();
        let broken_detail = Stub::new(Site::Avito, 3, true);
        let calls = Arc::clone(&broken_detail.detail_calls);
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(Stub::new(Site::Moteur, 0, false)),
            Box::new(broken_detail),
            Box::new(Stub::new(Site::Autoline, 2, false)),
            Box::new(Stub::new(Site::Truck1, 1, false)),
        ];
        let out = Aggregator::new(adapters, quiet_settings(dir.path()))
            .run(&query())
            .await;

        assert!(out.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.records.len(), 3);
        assert!(out
            .records
            .iter()
            .all(|r| r.site == Site::Autoline || r.site == Site::Truck1));
        assert_eq!(store::load_records(&out.output_path).unwrap(), out.records);
    }

    #[tokio::test]
    async fn unwritable_output_still_returns_records() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            // Directory, not a file
            output_path: dir.path().to_path_buf(),
            ..quiet_settings(dir.path())
        };
        let adapters: Vec<Box<dyn SourceAdapter>> =
            vec![Box::new(Stub::new(Site::Autoline, 2, false))];
        let out = Aggregator::new(adapters, settings).run(&query()).await;
        assert_eq!(out.records.len(), 2);
        assert!(out.error.is_some());
    }

    #[test]
    fn finalize_drops_relative_links_and_duplicates() {
        let records = vec![
            ad(Site::Moteur, "https://www.moteur.ma/1", "Today", "1 DH"),
            ad(Site::Moteur, "/relative/2", "Today", "1 DH"),
            ad(Site::Avito, "https://www.moteur.ma/1", "Today", "9 DH"),
            ad(Site::Avito, "", "Today", "1 DH"),
        ];
        let out = finalize(records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].site, Site::Moteur);
    }

    #[test]
    fn sort_descending_on_date_then_price() {
        let mut records = vec![
            ad(Site::Moteur, "https://a/1", "10-03-2024", "50 000 DH"),
            ad(Site::Moteur, "https://a/2", "12-03-2024", "20 000 DH"),
            ad(Site::Moteur, "https://a/3", "10-03-2024", "150 000 DH"),
            ad(Site::Moteur, "https://a/4", "10-03-2024", "Sur demande"),
        ];
        sort_records(&mut records);
        let links: Vec<&str> = records.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(links, vec!["https://a/2", "https://a/3", "https://a/1", "https://a/4"]);
    }

    #[test]
    fn sort_compares_date_text_not_calendar() {
        let mut records = vec![
            ad(Site::Moteur, "https://a/feb", "01-02-2024", "1 DH"),
            ad(Site::Moteur, "https://a/jan", "31-01-2024", "1 DH"),
        ];
        sort_records(&mut records);
        assert_eq!(records[0].link, "https://a/jan");
    }

    #[test]
    fn sort_is_stable_on_full_ties() {
        let mut records = vec![
            ad(Site::Autoline, "https://a/first", "Today", "Sur demande"),
            ad(Site::Truck1, "https://a/second", "Today", "Sur demande"),
        ];
        sort_records(&mut records);
        assert_eq!(records[0].link, "https://a/first");
    }
}
