//! Avito.ma: listings and ads are rendered from a `__NEXT_DATA__` JSON payload.
//!
//! The payload shape has changed over time, so both phases try the current
//! `pageProps` layout first, then the older apollo normalized cache (entries keyed by
//! `Type:id`, with images stored as references to sibling entries), then plain HTML.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    absolute_image, absolutize, cap_candidates, fetch_page, first_match, first_text, list_from,
    non_empty, passes_recency, SourceAdapter, Strategy,
};
use crate::http::HttpClient;
use crate::model::{AdRecord, CandidateRef, Query, Site};

const SITE: Site = Site::Avito;

static NEXT_DATA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"p[class*="price"], p[class*="Price"]"#).unwrap());
static DATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"time, span[class*="date"], span[class*="Date"]"#).unwrap()
});

pub struct Avito {
    client: HttpClient,
    limit: usize,
}

impl Avito {
    pub fn new(client: HttpClient, limit: usize) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl SourceAdapter for Avito {
    fn site(&self) -> Site {
        SITE
    }

    async fn list(&self, query: &Query) -> Vec<CandidateRef> {
        list_from(&self.client, SITE, &query.category_url, self.limit, parse_list).await
    }

    async fn detail(&self, candidate: &CandidateRef) -> Option<AdRecord> {
        let body = fetch_page(&self.client, SITE, &candidate.url).await?;
        parse_detail(&body, candidate)
    }
}

/// Parsed `__NEXT_DATA__` payload plus the document it came from.
pub(crate) struct Page {
    doc: Html,
    data: Option<Value>,
}

impl Page {
    pub(crate) fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let data = doc
            .select(&NEXT_DATA)
            .next()
            .map(|script| script.text().collect::<String>())
            .and_then(|raw| match serde_json::from_str::<Value>(&raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("{}: unreadable __NEXT_DATA__: {}", SITE, e);
                    None
                }
            });
        Self { doc, data }
    }

    fn page_props(&self) -> Option<&Value> {
        self.data.as_ref()?.pointer("/props/pageProps")
    }

    fn apollo_state(&self) -> Option<&serde_json::Map<String, Value>> {
        self.page_props()?.get("apolloState")?.as_object()
    }
}

fn str_at<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)?.as_str().map(str::trim).filter(|s| !s.is_empty())
}

// ── List ──

pub(crate) fn parse_list(html: &str, limit: usize) -> Vec<CandidateRef> {
    let page = Page::parse(html);
    let strategies: [Strategy<Page, Vec<CandidateRef>>; 4] = [
        ("componentProps.ads", list_component_props),
        ("pageProps.ads", list_page_props),
        ("apolloState", list_apollo),
        ("html-links", list_html),
    ];
    first_match(SITE, &page, &strategies)
        .map(|ads| cap_candidates(ads, limit))
        .unwrap_or_default()
}

fn list_component_props(page: &Page) -> Option<Vec<CandidateRef>> {
    let ads = page.page_props()?.pointer("/componentProps/ads/ads")?.as_array()?;
    non_empty(ads.iter().filter_map(candidate_from_ad).collect())
}

fn list_page_props(page: &Page) -> Option<Vec<CandidateRef>> {
    let ads = page.page_props()?.pointer("/ads/ads")?.as_array()?;
    non_empty(ads.iter().filter_map(candidate_from_ad).collect())
}

fn candidate_from_ad(ad: &Value) -> Option<CandidateRef> {
    let url = absolutize(SITE.origin(), str_at(ad, "href")?)?;
    let image = str_at(ad, "defaultImage")
        .or_else(|| {
            ad.get("images")?
                .as_array()?
                .first()?
                .as_str()
                .filter(|s| !s.is_empty())
        })
        .map(|src| absolute_image(SITE.origin(), src))
        .unwrap_or_default();
    Some(CandidateRef::new(url, image))
}

fn list_apollo(page: &Page) -> Option<Vec<CandidateRef>> {
    let state = page.apollo_state()?;
    let ads = state
        .values()
        .filter(|v| v.get("__typename").and_then(Value::as_str) == Some("Ad"))
        .filter_map(|ad| {
            let url = absolutize(SITE.origin(), str_at(ad, "url")?)?;
            let image = apollo_image(state, ad)
                .map(|src| absolute_image(SITE.origin(), &src))
                .unwrap_or_default();
            Some(CandidateRef::new(url, image))
        })
        .collect();
    non_empty(ads)
}

/// First image of an apollo `Ad`, following an `id` reference to a sibling entry
/// when present, else reading the inline object.
fn apollo_image(state: &serde_json::Map<String, Value>, ad: &Value) -> Option<String> {
    let img_ref = ad.get("images")?.as_array()?.first()?;
    if !img_ref.is_object() {
        return None;
    }
    let target = img_ref
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| state.get(id))
        .unwrap_or(img_ref);
    str_at(target, "url")
        .or_else(|| str_at(target, "uri"))
        .map(str::to_string)
}

/// Last resort: ad pages on Avito end in `.htm`.
fn list_html(page: &Page) -> Option<Vec<CandidateRef>> {
    let ads = page
        .doc
        .select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let path = href.split(['?', '#']).next().unwrap_or_default();
            if !path.ends_with(".htm") {
                return None;
            }
            // Tracking queries would otherwise split one ad into several candidates
            let url = absolutize(SITE.origin(), path)?;
            if !url.contains("avito.ma") {
                return None;
            }
            let image = a
                .select(&IMG)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| absolute_image(SITE.origin(), src))
                .unwrap_or_default();
            Some(CandidateRef::new(url, image))
        })
        .collect();
    non_empty(ads)
}

// ── Detail ──

/// Fields any detail strategy can recover.
#[derive(Debug, Default)]
pub(crate) struct AdFields {
    price: Option<String>,
    model: Option<String>,
    date: Option<String>,
    phone: Option<String>,
    image: Option<String>,
}

pub(crate) fn parse_detail(html: &str, candidate: &CandidateRef) -> Option<AdRecord> {
    let page = Page::parse(html);
    let strategies: [Strategy<Page, AdFields>; 3] = [
        ("pageProps.ad", detail_page_props),
        ("apolloState", detail_apollo),
        ("html", detail_html),
    ];
    let fields = first_match(SITE, &page, &strategies)?;

    let published = fields.date.unwrap_or_else(|| "N/A".to_string());
    if !passes_recency(SITE, &candidate.url, &published) {
        return None;
    }

    let image = fields
        .image
        .map(|src| absolute_image(SITE.origin(), &src))
        .filter(|src| !src.is_empty())
        .unwrap_or_else(|| candidate.image_hint.clone());

    Some(AdRecord {
        site: SITE,
        model: fields.model.unwrap_or_else(|| "N/A".to_string()),
        price: fields.price.unwrap_or_else(|| "N/A".to_string()),
        contact: String::new(),
        link: candidate.url.clone(),
        phone: fields.phone.unwrap_or_else(|| "N/A".to_string()),
        published,
        image,
    })
}

/// Price amount rendered as `"<n> DH"`; zero, empty and null count as missing.
fn price_label(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(format!("{} DH", n)),
        Value::String(s) if !s.trim().is_empty() && s.trim() != "0" => {
            Some(format!("{} DH", s.trim()))
        }
        _ => None,
    }
}

fn detail_page_props(page: &Page) -> Option<AdFields> {
    let ad = page.page_props()?.get("ad")?;
    if !ad.as_object().is_some_and(|o| !o.is_empty()) {
        return None;
    }
    let image = str_at(ad, "defaultImage")
        .or_else(|| ad.get("images")?.as_array()?.first()?.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(AdFields {
        price: price_label(ad.pointer("/price/value")),
        model: str_at(ad, "subject").map(str::to_string),
        date: str_at(ad, "date").map(str::to_string),
        phone: ad
            .pointer("/seller/phone/number")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        image,
    })
}

fn detail_apollo(page: &Page) -> Option<AdFields> {
    let state = page.apollo_state()?;
    let (key, ad) = state.iter().find(|(k, _)| k.starts_with("Ad:"))?;
    debug!("{}: using apollo entry {}", SITE, key);
    Some(AdFields {
        price: price_label(ad.pointer("/price/amount")),
        model: str_at(ad, "subject").map(str::to_string),
        date: str_at(ad, "listTime").map(str::to_string),
        phone: None,
        image: apollo_image(state, ad),
    })
}

fn detail_html(page: &Page) -> Option<AdFields> {
    Some(AdFields {
        price: first_text(&page.doc, &[&PRICE]),
        model: first_text(&page.doc, &[&H1]),
        date: first_text(&page.doc, &[&DATE]),
        phone: None,
        image: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fixture;

    fn candidate() -> CandidateRef {
        CandidateRef::new(
            "https://www.avito.ma/fr/casablanca/fourgon/sprinter_55001.htm",
            "https://content.avito.ma/list.jpg",
        )
    }

    #[test]
    fn list_component_props_schema() {
        let ads = parse_list(&fixture("avito_list_component.html"), 10);
        assert_eq!(ads.len(), 2);
        assert_eq!(
            ads[0].url,
            "https://www.avito.ma/fr/casablanca/fourgon/sprinter_55001.htm"
        );
        assert_eq!(ads[0].image_hint, "https://content.avito.ma/55001.jpg");
        // images[0] fallback
        assert_eq!(ads[1].image_hint, "https://content.avito.ma/55002-a.jpg");
    }

    #[test]
    fn list_apollo_resolves_image_references() {
        let ads = parse_list(&fixture("avito_list_apollo.html"), 10);
        assert_eq!(ads.len(), 2);
        let by_url = |u: &str| ads.iter().find(|a| a.url.ends_with(u)).unwrap();
        assert_eq!(
            by_url("master_77.htm").image_hint,
            "https://content.avito.ma/img-77.jpg"
        );
        assert_eq!(
            by_url("ducato_78.htm").image_hint,
            "https://content.avito.ma/inline-78.jpg"
        );
    }

    #[test]
    fn list_without_json_scans_links() {
        let html = r#"<html><body>
            <a href="/fr/rabat/fourgon/transit_9.htm"><img src="https://content.avito.ma/9.jpg"></a>
            <a href="/fr/rabat/fourgon/transit_9.htm?x=1">same ad, tracking query</a>
            <a href="/fr/aide">aide</a>
        </body></html>"#;
        let ads = parse_list(html, 10);
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].url, "https://www.avito.ma/fr/rabat/fourgon/transit_9.htm");
        assert_eq!(ads[0].image_hint, "https://content.avito.ma/9.jpg");
    }

    #[test]
    fn list_with_broken_json_is_soft() {
        let html = r#"<html><body><script id="__NEXT_DATA__">{not json</script></body></html>"#;
        assert!(parse_list(html, 10).is_empty());
    }

    #[test]
    fn detail_page_props_schema() {
        let ad = parse_detail(&fixture("avito_detail.html"), &candidate()).unwrap();
        assert_eq!(ad.site, Site::Avito);
        assert_eq!(ad.model, "Mercedes Sprinter 2019 17 places");
        assert_eq!(ad.price, "245000 DH");
        assert_eq!(ad.phone, "0600112233");
        assert_eq!(ad.image, "https://content.avito.ma/detail-55001.jpg");
        assert_eq!(ad.contact, "");
    }

    #[test]
    fn detail_apollo_fallback() {
        let ad = parse_detail(&fixture("avito_detail_apollo.html"), &candidate()).unwrap();
        assert_eq!(ad.model, "Renault Master minibus");
        assert_eq!(ad.price, "198000 DH");
        assert_eq!(ad.phone, "N/A");
        assert_eq!(ad.image, "https://content.avito.ma/apollo-img.jpg");
    }

    #[test]
    fn detail_html_fallback_keeps_list_image() {
        let html = r#"<html><body>
            <h1>Fiat Ducato</h1><p class="sc-1x0vz2r-0 Price">120 000 DH</p>
            <time datetime="x">Aujourd'hui</time>
        </body></html>"#;
        let ad = parse_detail(html, &candidate()).unwrap();
        assert_eq!(ad.model, "Fiat Ducato");
        assert_eq!(ad.price, "120 000 DH");
        assert_eq!(ad.published, "Aujourd'hui");
        assert_eq!(ad.image, "https://content.avito.ma/list.jpg");
    }

    #[test]
    fn detail_missing_fields_use_placeholders() {
        let ad = parse_detail("<html><body></body></html>", &candidate()).unwrap();
        assert_eq!(ad.model, "N/A");
        assert_eq!(ad.price, "N/A");
        assert_eq!(ad.published, "N/A");
    }

    #[test]
    fn detail_rejects_old_ad() {
        let html = r#"<html><body><script id="__NEXT_DATA__">
            {"props":{"pageProps":{"ad":{"subject":"Old","date":"2019-05-01T10:00:00.000Z","price":{"value":1}}}}}
        </script></body></html>"#;
        assert!(parse_detail(html, &candidate()).is_none());
    }

    #[test]
    fn detail_with_absurd_relative_date_is_kept() {
        let html = r#"<html><body>
            <h1>Iveco Daily</h1><time>il y a 999999999 jours</time>
        </body></html>"#;
        let ad = parse_detail(html, &candidate()).unwrap();
        assert_eq!(ad.published, "il y a 999999999 jours");
    }

    #[test]
    fn zero_price_is_missing() {
        assert_eq!(price_label(Some(&serde_json::json!(0))), None);
        assert_eq!(price_label(Some(&serde_json::json!(null))), None);
        assert_eq!(
            price_label(Some(&serde_json::json!(95000))).as_deref(),
            Some("95000 DH")
        );
    }
}
