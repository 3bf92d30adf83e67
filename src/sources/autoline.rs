use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{
    absolute_image, absolutize, attr_any, cap_candidates, fetch_page, first_image, first_text,
    list_from, passes_recency, SourceAdapter,
};
use crate::http::HttpClient;
use crate::model::{AdRecord, CandidateRef, Query, Site};

const SITE: Site = Site::Autoline;
const LISTING_URL: &str = "https://autoline.co.ma/-/minibus--c5835";

static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.sl-item").unwrap());
static TITLE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.sales-item-title-link[href]").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.price").unwrap());
static ITEM_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.item-price").unwrap());
static SL_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.sl-item__price").unwrap());
static GALLERY_IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img.gallery__main-image").unwrap());
static MAIN_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img.main-image").unwrap());

/// Card-list source. Detail pages carry no usable publish date.
pub struct Autoline {
    client: HttpClient,
    limit: usize,
}

impl Autoline {
    pub fn new(client: HttpClient, limit: usize) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl SourceAdapter for Autoline {
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
            let href = card.select(&TITLE_LINK).next()?.value().attr("href")?;
            let url = absolutize(SITE.origin(), href)?;
            // Lazy-loaded cards keep the real image in data-src
            let image = card
                .select(&IMG)
                .next()
                .and_then(|img| attr_any(img, &["data-src", "src"]))
                .map(|src| absolute_image(SITE.origin(), &src))
                .unwrap_or_default();
            Some(CandidateRef::new(url, image))
        })
        .collect();
    cap_candidates(ads, limit)
}

pub(crate) fn parse_detail(html: &str, candidate: &CandidateRef) -> Option<AdRecord> {
    let doc = Html::parse_document(html);

    let published = "Today".to_string();
    if !passes_recency(SITE, &candidate.url, &published) {
        return None;
    }

    let model = first_text(&doc, &[&H1]).unwrap_or_else(|| "Minibus".to_string());
    let price = first_text(&doc, &[&PRICE, &ITEM_PRICE, &SL_PRICE])
        .unwrap_or_else(|| "Sur demande".to_string());
    let image = if candidate.image_hint.is_empty() {
        first_image(&doc, &[&GALLERY_IMG, &MAIN_IMG], &["src"])
            .map(|src| absolute_image(SITE.origin(), &src))
            .unwrap_or_default()
    } else {
        candidate.image_hint.clone()
    };

    Some(AdRecord {
        site: SITE,
        model,
        price,
        contact: "Autoline Seller".to_string(),
        link: candidate.url.clone(),
        phone: "N/A".to_string(),
        published,
        image,
    })
}
