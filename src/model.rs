use std::fmt;

use serde::{Deserialize, Serialize};

/// The marketplaces we aggregate, in the order a run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    #[serde(rename = "Moteur.ma")]
    Moteur,
    #[serde(rename = "Avito.ma")]
    Avito,
    #[serde(rename = "Maroc-Utilitaires")]
    MarocUtilitaires,
    #[serde(rename = "Autoline")]
    Autoline,
    #[serde(rename = "Truck1.co.ma")]
    Truck1,
}

impl Site {
    pub const ALL: [Site; 5] = [
        Site::Moteur,
        Site::Avito,
        Site::MarocUtilitaires,
        Site::Autoline,
        Site::Truck1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Site::Moteur => "Moteur.ma",
            Site::Avito => "Avito.ma",
            Site::MarocUtilitaires => "Maroc-Utilitaires",
            Site::Autoline => "Autoline",
            Site::Truck1 => "Truck1.co.ma",
        }
    }

    /// Origin used to absolutize relative links and images.
    pub fn origin(self) -> &'static str {
        match self {
            Site::Moteur => "https://www.moteur.ma",
            Site::Avito => "https://www.avito.ma",
            Site::MarocUtilitaires => "https://www.maroc-utilitaires.com",
            Site::Autoline => "https://autoline.co.ma",
            Site::Truck1 => "https://www.truck1.co.ma",
        }
    }

    /// Case-insensitive lookup by display name or a short alias.
    pub fn from_label(label: &str) -> Option<Site> {
        let l = label.trim().to_lowercase();
        Site::ALL.into_iter().find(|s| {
            let name = s.name().to_lowercase();
            name == l || name.split(['.', '-']).next() == Some(l.as_str())
        })
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One normalized classified ad.
///
/// Serde names match the persisted column schema:
/// `site; model; prix; contact; lien; telephone; date; image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRecord {
    pub site: Site,
    #[serde(default)]
    pub model: String,
    /// Display text; the numeric magnitude comes from `price::parse_price`.
    #[serde(rename = "prix", default)]
    pub price: String,
    #[serde(default)]
    pub contact: String,
    #[serde(rename = "lien")]
    pub link: String,
    #[serde(rename = "telephone", default)]
    pub phone: String,
    /// Raw publish date as shown by the source.
    #[serde(rename = "date", default)]
    pub published: String,
    #[serde(default)]
    pub image: String,
}

impl AdRecord {
    pub fn price_value(&self) -> u64 {
        crate::price::parse_price(&self.price)
    }

    /// A link that can be persisted: non-empty and carrying an http(s) scheme.
    pub fn has_absolute_link(&self) -> bool {
        self.link.starts_with("https://") || self.link.starts_with("http://")
    }
}

/// Output of a list phase, consumed by exactly one detail call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRef {
    pub url: String,
    /// Image seen on the listing card; empty when none.
    pub image_hint: String,
}

impl CandidateRef {
    pub fn new(url: impl Into<String>, image_hint: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            image_hint: image_hint.into(),
        }
    }
}

/// What a run searches for.
#[derive(Debug, Clone)]
pub struct Query {
    /// Free-text keyword for sources with a search form.
    pub keyword: String,
    /// Category page for the JSON-backed source.
    pub category_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_labels() {
        assert_eq!(Site::from_label("avito"), Some(Site::Avito));
        assert_eq!(Site::from_label("Truck1.co.ma"), Some(Site::Truck1));
        assert_eq!(Site::from_label("maroc"), Some(Site::MarocUtilitaires));
        assert_eq!(Site::from_label("leboncoin"), None);
    }

    #[test]
    fn absolute_link_check() {
        let mut ad = AdRecord {
            site: Site::Autoline,
            model: "Minibus".into(),
            price: String::new(),
            contact: String::new(),
            link: "https://autoline.co.ma/-/x".into(),
            phone: String::new(),
            published: String::new(),
            image: String::new(),
        };
        assert!(ad.has_absolute_link());
        ad.link = "/-/x".into();
        assert!(!ad.has_absolute_link());
        ad.link.clear();
        assert!(!ad.has_absolute_link());
    }
}
