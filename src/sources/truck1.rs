use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::{
    absolute_image, absolutize, attr_any, cap_candidates, fetch_page, first_image, first_match,
    first_text, list_from, non_empty, passes_recency, SourceAdapter, Strategy,
};
use crate::http::HttpClient;
use crate::model::{AdRecord, CandidateRef, Query, Site};

const SITE: Site = Site::Truck1;
const LISTING_URL: &str = "https://www.truck1.co.ma/bus-et-autocars/minibus";
const DETAIL_MARKER: &str = "/minibus/";

static CONTAINER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"div[class*="sale-item"], div[class*="sales-item"], div[class*="listing-item"], article[class*="item"]"#,
    )
    .unwrap()
});
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.price-value").unwrap());
static MAIN_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img.main-image").unwrap());

/// Generic-HTML source; detail pages live under a `/minibus/` path segment.
pub struct Truck1 {
    client: HttpClient,
    limit: usize,
}

impl Truck1 {
    pub fn new(client: HttpClient, limit: usize) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl SourceAdapter for Truck1 {
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

/// Detail link: under `/minibus/` but not the category page itself.
fn detail_url(href: &str) -> Option<String> {
    let trimmed = href.trim().trim_end_matches('/');
    if !href.contains(DETAIL_MARKER) || trimmed.ends_with("/minibus") {
        return None;
    }
    absolutize(SITE.origin(), href)
}

fn card_image(scope: ElementRef) -> String {
    scope
        .select(&IMG)
        .next()
        .and_then(|img| attr_any(img, &["data-src", "src"]))
        .map(|src| absolute_image(SITE.origin(), &src))
        .unwrap_or_default()
}

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
            let url = item
                .select(&ANCHOR)
                .find_map(|a| detail_url(a.value().attr("href")?))?;
            Some(CandidateRef::new(url, card_image(item)))
        })
        .collect();
    non_empty(ads)
}

fn from_link_scan(doc: &Html) -> Option<Vec<CandidateRef>> {
    let ads = doc
        .select(&ANCHOR)
        .filter_map(|a| {
            let url = detail_url(a.value().attr("href")?)?;
            Some(CandidateRef::new(url, card_image(a)))
        })
        .collect();
    non_empty(ads)
}

pub(crate) fn parse_detail(html: &str, candidate: &CandidateRef) -> Option<AdRecord> {
    let doc = Html::parse_document(html);

    let published = "Today".to_string();
    if !passes_recency(SITE, &candidate.url, &published) {
        return None;
    }

    let model = first_text(&doc, &[&H1]).unwrap_or_else(|| "Truck1 Ad".to_string());
    let price = first_text(&doc, &[&PRICE]).unwrap_or_else(|| "Sur demande".to_string());
    let image = if candidate.image_hint.is_empty() {
        first_image(&doc, &[&MAIN_IMG], &["src"])
            .map(|src| absolute_image(SITE.origin(), &src))
            .unwrap_or_default()
    } else {
        candidate.image_hint.clone()
    };

    Some(AdRecord {
        site: SITE,
        model,
        price,
        contact: "Truck1 Seller".to_string(),
        link: candidate.url.clone(),
        phone: "N/A".to_string(),
        published,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fixture;

    #[test]
    fn link_scan_skips_category_page() {
        let ads = parse_list(&fixture("truck1_list.html"), 10);
        let urls: Vec<&str> = ads.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.truck1.co.ma/minibus/mercedes-benz-sprinter-a1234.html",
                "https://www.truck1.co.ma/minibus/ford-transit-a5678.html",
            ]
        );
    }

    #[test]
    fn containers_take_priority() {
        let html = r#"<html><body>
            <div class="sales-item-card">
              <img src="/img/c1.jpg"><a href="/minibus/iveco-daily-a1.html">Iveco</a>
            </div>
            <a href="/minibus/hors-carte-a2.html">hors carte</a>
        </body></html>"#;
        let ads = parse_list(html, 10);
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].image_hint, "https://www.truck1.co.ma/img/c1.jpg");
    }

    #[test]
    fn list_limit_applies() {
        let links: String = (0..25)
            .map(|i| format!(r#"<a href="/minibus/bus-a{}.html">b</a>"#, i))
            .collect();
        let ads = parse_list(&format!("<html><body>{}</body></html>", links), 10);
        assert_eq!(ads.len(), 10);
    }

    #[test]
    fn detail_fields() {
        let c = CandidateRef::new("https://www.truck1.co.ma/minibus/ford-transit-a5678.html", "");
        let ad = parse_detail(&fixture("truck1_detail.html"), &c).unwrap();
        assert_eq!(ad.model, "Ford Transit 17+1");
        assert_eq!(ad.price, "210 000 MAD");
        assert_eq!(ad.image, "https://www.truck1.co.ma/photos/5678.jpg");
        assert_eq!(ad.site, Site::Truck1);
    }

    #[test]
    fn detail_defaults() {
        let c = CandidateRef::new("https://www.truck1.co.ma/minibus/x.html", "");
        let ad = parse_detail("<html><body></body></html>", &c).unwrap();
        assert_eq!(ad.model, "Truck1 Ad");
        assert_eq!(ad.price, "Sur demande");
    }
}
