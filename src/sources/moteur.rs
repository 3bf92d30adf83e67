use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::{
    absolute_image, absolutize, attr_any, cap_candidates, fetch_page, first_image, first_match,
    first_text, find_text, list_from, non_empty, passes_recency, SourceAdapter, Strategy,
};
use crate::http::HttpClient;
use crate::model::{AdRecord, CandidateRef, Query, Site};

const SITE: Site = Site::Moteur;
const DETAIL_MARKER: &str = "/detail-annonce/";
const PLACEHOLDER_MODEL: &str = "Utilitaire";

static CONTAINER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"div[class*="picture"], div[class*="item-annonce"], div[class*="content-inner-listing"]"#,
    )
    .unwrap()
});
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[class*="price"]"#).unwrap());
static DETAIL_IMG: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img[class*="fluid"], img[class*="detail"]"#).unwrap()
});
static PHONE_TOKEN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-token][data-seller]").unwrap());

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{2}-\d{2}-\d{4}").unwrap());

/// Generic-HTML source with a keyword search and a phone-number XHR.
pub struct Moteur {
    client: HttpClient,
    limit: usize,
}

impl Moteur {
    pub fn new(client: HttpClient, limit: usize) -> Self {
        Self { client, limit }
    }

    async fn fetch_phone(&self, token: &PhoneToken) -> String {
        let url = token.endpoint();
        match self.client.get_xhr_json(&url).await {
            Ok(body) => phone_from_json(&body),
            Err(e) => {
                warn!("{} phone lookup failed for seller {}: {}", SITE, token.seller, e);
                "N/A".to_string()
            }
        }
    }
}

fn encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

pub fn search_url(keyword: &str) -> String {
    format!(
        "https://www.moteur.ma/fr/occasion/voitures/recherche/?search=1&motcle={}",
        encode(keyword)
    )
}

#[async_trait]
impl SourceAdapter for Moteur {
    fn site(&self) -> Site {
        SITE
    }

    async fn list(&self, query: &Query) -> Vec<CandidateRef> {
        list_from(&self.client, SITE, &search_url(&query.keyword), self.limit, parse_list).await
    }

    async fn detail(&self, candidate: &CandidateRef) -> Option<AdRecord> {
        let body = fetch_page(&self.client, SITE, &candidate.url).await?;
        let (mut record, token) = parse_detail(&body, candidate)?;
        if let Some(token) = token {
            record.phone = self.fetch_phone(&token).await;
        }
        Some(record)
    }
}

// ── List ──

pub(crate) fn parse_list(html: &str, limit: usize) -> Vec<CandidateRef> {
    let doc = Html::parse_document(html);
    let strategies: [Strategy<Html, Vec<CandidateRef>>; 2] = [
        ("containers", from_containers),
        ("link-scan", from_link_scan),
    ];
    first_match(SITE, &doc, &strategies)
        .map(|ads| cap_candidates(ads, limit))
        .unwrap_or_default()
}

fn from_containers(doc: &Html) -> Option<Vec<CandidateRef>> {
    let ads = doc
        .select(&CONTAINER)
        .filter_map(|item| {
            let href = item.select(&ANCHOR).next()?.value().attr("href")?;
            if !href.contains(DETAIL_MARKER) {
                return None;
            }
            let url = absolutize(SITE.origin(), href)?;
            let image = item
                .select(&IMG)
                .next()
                .and_then(|img| attr_any(img, &["src", "data-src"]))
                .map(|src| absolute_image(SITE.origin(), &src))
                .unwrap_or_default();
            Some(CandidateRef::new(url, image))
        })
        .collect();
    non_empty(ads)
}

fn from_link_scan(doc: &Html) -> Option<Vec<CandidateRef>> {
    let ads = doc
        .select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            if !href.contains(DETAIL_MARKER) {
                return None;
            }
            let url = absolutize(SITE.origin(), href)?;
            // Image inside the anchor, else anywhere under its parent
            let image = a
                .select(&IMG)
                .next()
                .or_else(|| {
                    a.parent()
                        .and_then(scraper::ElementRef::wrap)
                        .and_then(|p| p.select(&IMG).next())
                })
                .and_then(|img| attr_any(img, &["src"]))
                .map(|src| absolute_image(SITE.origin(), &src))
                .unwrap_or_default();
            Some(CandidateRef::new(url, image))
        })
        .collect();
    non_empty(ads)
}

// ── Detail ──

/// Seller/token pair the phone XHR is keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PhoneToken {
    pub seller: String,
    pub token: String,
}

impl PhoneToken {
    fn endpoint(&self) -> String {
        format!(
            "https://www.moteur.ma/fr/occasion/get_phone/{}/?token={}",
            encode(&self.seller),
            encode(&self.token)
        )
    }
}

pub(crate) fn parse_detail(
    html: &str,
    candidate: &CandidateRef,
) -> Option<(AdRecord, Option<PhoneToken>)> {
    let doc = Html::parse_document(html);

    let published = find_text(&doc, &DATE_RE).unwrap_or_else(|| "Today".to_string());
    if !passes_recency(SITE, &candidate.url, &published) {
        return None;
    }

    let model = first_text(&doc, &[&H1]).unwrap_or_else(|| PLACEHOLDER_MODEL.to_string());
    let price = first_text(&doc, &[&PRICE]).unwrap_or_else(|| "N/A".to_string());

    let image = if candidate.image_hint.is_empty() {
        first_image(&doc, &[&DETAIL_IMG], &["src"])
            .map(|src| absolute_image(SITE.origin(), &src))
            .unwrap_or_default()
    } else {
        candidate.image_hint.clone()
    };

    let token = doc.select(&PHONE_TOKEN).next().and_then(|el| {
        let seller = el.value().attr("data-seller")?.trim();
        let token = el.value().attr("data-token")?.trim();
        if seller.is_empty() || token.is_empty() {
            return None;
        }
        Some(PhoneToken {
            seller: seller.to_string(),
            token: token.to_string(),
        })
    });
    if token.is_none() {
        debug!("{}: no phone token on {}", SITE, candidate.url);
    }

    let record = AdRecord {
        site: SITE,
        model,
        price,
        contact: "Vendeur (Moteur.ma)".to_string(),
        link: candidate.url.clone(),
        phone: "N/A".to_string(),
        published,
        image,
    };
    Some((record, token))
}

/// `phone` field of the XHR answer; anything else means unavailable.
pub(crate) fn phone_from_json(body: &serde_json::Value) -> String {
    body.get("phone")
        .and_then(|p| match p {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "N/A".to_string())
}
