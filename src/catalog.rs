//! Platform catalog: deep-link and web URL templates per search platform.
//!
//! The catalog is a static table fixed at process start. Each platform has
//! a mandatory web URL template, an optional deep-link (custom URL scheme)
//! template, and a human-readable display name used in alerts.

use serde::{Deserialize, Serialize};

use crate::query::encode_query;

/// Placeholder substituted with the percent-encoded query.
const QUERY_PLACEHOLDER: &str = "{query}";

/// A third-party search platform the dispatcher can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    Youtube,
    Xiaohongshu,
    Bilibili,
}

impl Platform {
    /// All platforms, in display order.
    pub const ALL: [Platform; 3] = [
        Platform::Youtube,
        Platform::Xiaohongshu,
        Platform::Bilibili,
    ];

    /// Static catalog entry for this platform.
    pub fn spec(&self) -> &'static PlatformSpec {
        match self {
            Platform::Youtube => &YOUTUBE,
            Platform::Xiaohongshu => &XIAOHONGSHU,
            Platform::Bilibili => &BILIBILI,
        }
    }

    /// Human-readable name, as shown in user-facing alerts.
    pub fn display_name(&self) -> &'static str {
        self.spec().display_name
    }

    /// Deep-link URL for a raw query, if the platform has an app scheme.
    pub fn app_url(&self, raw_query: &str) -> Option<String> {
        self.spec().app_url(raw_query)
    }

    /// Web search URL for a raw query.
    pub fn web_url(&self, raw_query: &str) -> String {
        self.spec().web_url(raw_query)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "youtube" | "yt" => Ok(Platform::Youtube),
            "xiaohongshu" | "xhs" | "rednote" => Ok(Platform::Xiaohongshu),
            "bilibili" | "bili" => Ok(Platform::Bilibili),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// Catalog entry for one platform.
///
/// Templates use `{query}` as the placeholder for the encoded query.
#[derive(Debug, Clone)]
pub struct PlatformSpec {
    pub platform: Platform,
    pub display_name: &'static str,
    /// Custom URL scheme template; `None` when no native app is known.
    pub app_url_template: Option<&'static str>,
    pub web_url_template: &'static str,
}

impl PlatformSpec {
    pub fn app_url(&self, raw_query: &str) -> Option<String> {
        let encoded = encode_query(raw_query);
        self.app_url_template.map(|t| expand(t, &encoded))
    }

    pub fn web_url(&self, raw_query: &str) -> String {
        expand(self.web_url_template, &encode_query(raw_query))
    }
}

fn expand(template: &str, encoded_query: &str) -> String {
    template.replace(QUERY_PLACEHOLDER, encoded_query)
}

static YOUTUBE: PlatformSpec = PlatformSpec {
    platform: Platform::Youtube,
    display_name: "YouTube",
    app_url_template: Some("youtube://results?search_query={query}"),
    web_url_template: "https://www.youtube.com/results?search_query={query}",
};

static XIAOHONGSHU: PlatformSpec = PlatformSpec {
    platform: Platform::Xiaohongshu,
    display_name: "小红书",
    app_url_template: Some("xhsdiscover://search/result?keyword={query}"),
    web_url_template: "https://www.xiaohongshu.com/search_result?keyword={query}",
};

static BILIBILI: PlatformSpec = PlatformSpec {
    platform: Platform::Bilibili,
    display_name: "Bilibili",
    app_url_template: Some("bilibili://search?keyword={query}"),
    web_url_template: "https://search.bilibili.com/all?keyword={query}",
};
