pub mod autoline;
pub mod avito;
pub mod maroc_utilitaires;
pub mod moteur;
pub mod truck1;

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::dates;
use crate::http::HttpClient;
use crate::model::{AdRecord, CandidateRef, Query, Site};

/// Two-phase contract every marketplace implements.
///
/// Both phases fail soft: network and shape problems are logged and turned into an
/// empty list or `None`, never propagated to the pipeline.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn site(&self) -> Site;

    /// Candidate ads, source order, deduplicated by URL, at most the configured limit.
    async fn list(&self, query: &Query) -> Vec<CandidateRef>;

    /// Resolve one candidate. `None` when unreachable, unparseable or too old.
    async fn detail(&self, candidate: &CandidateRef) -> Option<AdRecord>;
}

/// All five adapters in their declared run order.
pub fn default_adapters(client: &HttpClient, limit: usize) -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(moteur::Moteur::new(client.clone(), limit)),
        Box::new(avito::Avito::new(client.clone(), limit)),
        Box::new(maroc_utilitaires::MarocUtilitaires::new(client.clone(), limit)),
        Box::new(autoline::Autoline::new(client.clone(), limit)),
        Box::new(truck1::Truck1::new(client.clone(), limit)),
    ]
}

// ── Strategy chains ──

/// A named extraction attempt: `Some` means found, `None` means try the next one.
pub(crate) type Strategy<I, T> = (&'static str, fn(&I) -> Option<T>);

pub(crate) fn first_match<I, T>(
    site: Site,
    input: &I,
    strategies: &[Strategy<I, T>],
) -> Option<T> {
    for (name, attempt) in strategies {
        if let Some(found) = attempt(input) {
            debug!("{}: strategy '{}' matched", site, name);
            return Some(found);
        }
        debug!("{}: strategy '{}' found nothing", site, name);
    }
    None
}

/// `Some` only for a non-empty list, so list strategies can chain on emptiness.
pub(crate) fn non_empty(items: Vec<CandidateRef>) -> Option<Vec<CandidateRef>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Hard ceiling on candidates per source and run, whatever the configured limit.
pub const MAX_CANDIDATES: usize = 10;

/// Deduplicate by URL (first occurrence wins) and keep at most `limit` entries,
/// never more than `MAX_CANDIDATES`.
pub(crate) fn cap_candidates(items: Vec<CandidateRef>, limit: usize) -> Vec<CandidateRef> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|c| !c.url.is_empty() && seen.insert(c.url.clone()))
        .take(limit.min(MAX_CANDIDATES))
        .collect()
}

// ── Fetch helpers ──

pub(crate) async fn fetch_page(client: &HttpClient, site: Site, url: &str) -> Option<String> {
    match client.get_text(url).await {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("{} fetch failed for {}: {}", site, url, e);
            None
        }
    }
}

/// Fetch a listing page and run the site's list parser on it.
pub(crate) async fn list_from(
    client: &HttpClient,
    site: Site,
    url: &str,
    limit: usize,
    parse: fn(&str, usize) -> Vec<CandidateRef>,
) -> Vec<CandidateRef> {
    info!("Fetching {} listing: {}", site, url);
    let Some(body) = fetch_page(client, site, url).await else {
        return Vec::new();
    };
    let ads = parse(&body, limit);
    info!("Found {} unique {} ads.", ads.len(), site);
    ads
}

/// Recency gate shared by every detail extractor.
pub(crate) fn passes_recency(site: Site, url: &str, raw_date: &str) -> bool {
    if dates::is_recent(raw_date) {
        true
    } else {
        info!("{}: {} excluded by date ({})", site, url, raw_date);
        false
    }
}

// ── HTML helpers ──

/// Resolve `href` against the site origin. Empty or unparseable input gives `None`.
pub(crate) fn absolutize(origin: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(origin)
        .and_then(|base| base.join(href))
        .map(String::from)
        .ok()
}

/// Like `absolutize`, but an image that cannot be resolved is just empty.
pub(crate) fn absolute_image(origin: &str, src: &str) -> String {
    absolutize(origin, src).unwrap_or_default()
}

/// Whitespace-normalized text of an element.
pub(crate) fn element_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match of any selector, in selector order.
pub(crate) fn first_text(doc: &Html, selectors: &[&Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        doc.select(sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    })
}

/// First text node in the document matching `re`, trimmed.
pub(crate) fn find_text(doc: &Html, re: &Regex) -> Option<String> {
    doc.root_element()
        .text()
        .find(|t| re.is_match(t))
        .map(|t| t.trim().to_string())
}

/// First non-empty attribute among `attrs`.
pub(crate) fn attr_any(el: ElementRef, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .filter_map(|a| el.value().attr(a))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// `src` of the first image matching any selector.
pub(crate) fn first_image(doc: &Html, selectors: &[&Selector], attrs: &[&str]) -> Option<String> {
    selectors
        .iter()
        .find_map(|sel| doc.select(sel).find_map(|img| attr_any(img, attrs)))
}

/// Fixture page with `{{TODAY}}`, `{{TODAY_SLASH}}` and `{{TODAY_ISO}}` replaced by
/// the current date,
/// so recency checks stay green whenever the suite runs.
#[cfg(test)]
pub(crate) fn fixture(name: &str) -> String {
    let now = chrono::Local::now();
    std::fs::read_to_string(format!("tests/fixtures/{}", name))
        .unwrap()
        .replace("{{TODAY}}", &now.format("%d-%m-%Y").to_string())
        .replace("{{TODAY_SLASH}}", &now.format("%d/%m/%Y").to_string())
        .replace("{{TODAY_ISO}}", &now.format("%Y-%m-%d").to_string())
}
