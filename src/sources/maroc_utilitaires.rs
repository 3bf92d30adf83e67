use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use super::{
    absolute_image, absolutize, attr_any, cap_candidates, fetch_page, first_image, first_text,
    find_text, list_from, passes_recency, SourceAdapter,
};
use crate::dates::UNKNOWN;
use crate::http::HttpClient;
use crate::model::{AdRecord, CandidateRef, Query, Site};

const SITE: Site = Site::MarocUtilitaires;
const LISTING_URL: &str = "https://www.maroc-utilitaires.com/minibus/3-37-v115/minibus-occasion.html";

static CARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.annonce-utilitaire").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static PRICE_TAG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.price-tag").unwrap());
static DETAIL_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img.img-fluid").unwrap());

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}").unwrap());
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+ DH").unwrap());

/// Card-list source with a fixed category page.
pub struct MarocUtilitaires {
    client: HttpClient,
    limit: usize,
}

impl MarocUtilitaires {
    pub fn new(client: HttpClient, limit: usize) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl SourceAdapter for MarocUtilitaires {
    fn site(&self) -> Site {
        SITE
    }

    async fn list(&self, _query: &Query) -> Vec<CandidateRef> {
        list_from(&self.client, SITE, LISTING_URL, self.limit, parse_list).await
    }

    async fn detail(&self, candidate: &CandidateRef) -> Option<AdRecord> {
        let body = fetch_page(&self.client, SITE, &candidate.url).await?;
        parse_detail(&body, candidate)
    }
}

pub(crate) fn parse_list(html: &str, limit: usize) -> Vec<CandidateRef> {
    let doc = Html::parse_document(html);
    let ads = doc
        .select(&CARD)
        .filter_map(|card| {
            let href = card.select(&ANCHOR).next()?.value().attr("href")?;
            let url = absolutize(SITE.origin(), href)?;
            let image = card
                .select(&IMG)
                .next()
                .and_then(|img| attr_any(img, &["src", "data-src", "data-original"]))
                .map(|src| absolute_image(SITE.origin(), &src))
                .unwrap_or_default();
            Some(CandidateRef::new(url, image))
        })
        .collect();
    cap_candidates(ads, limit)
}

pub(crate) fn parse_detail(html: &str, candidate: &CandidateRef) -> Option<AdRecord> {
    let doc = Html::parse_document(html);

    let published = find_text(&doc, &DATE_RE).unwrap_or_else(|| UNKNOWN.to_string());
    if !passes_recency(SITE, &candidate.url, &published) {
        return None;
    }

    let model = first_text(&doc, &[&H1]).unwrap_or_else(|| "Utilitaire".to_string());
    let price = first_text(&doc, &[&PRICE_TAG])
        .or_else(|| find_text(&doc, &PRICE_RE))
        .unwrap_or_else(|| "Sur demande".to_string());

    let image = if candidate.image_hint.is_empty() {
        first_image(&doc, &[&DETAIL_IMG], &["src"])
            .map(|src| absolute_image(SITE.origin(), &src))
            .unwrap_or_default()
    } else {
        candidate.image_hint.clone()
    };

    Some(AdRecord {
        site: SITE,
        model,
        price,
        contact: "Vendeur (Maroc-Utilitaires)".to_string(),
        link: candidate.url.clone(),
        // Phone is behind a form on this site; never fetched
        phone: "Voir site".to_string(),
        published,
        image,
    })
}
