//! Crawl frontier for store-locator sites.
//!
//! Two jobs: keep the visit budget honest (normalized dedup, page cap,
//! depth cap), and turn one known region page into the other 46 when
//! the URL encodes the prefecture.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use tenposcan_common::region::PREFECTURE_ROMAJI;

use crate::extractor::STORE_PAGE_PATTERNS;

pub const MAX_PAGES_PER_COMPANY: usize = 10;
pub const MAX_DEPTH: usize = 2;

/// Anchor texts that lead to listing pages.
const LISTING_KEYWORDS: [&str; 7] = [
    "店舗", "アクセス", "教室", "スクール", "支店", "営業所", "拠点",
];

/// How a locator encodes the prefecture in its URLs. Knowing the shape
/// of one region URL lets us enumerate the rest without crawling for
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPatternFamily {
    /// Two-digit JIS code segment: `/shop/pref/13/`.
    RegionCode,
    /// Romanized name segment: `/shop/tokyo/`.
    RomanizedRegion,
    /// Numeric store id: `/shop/detail/1042/`.
    StoreId,
    /// No recognizable structure; treat as a one-off listing page.
    SingleListing,
}

/// Classify a URL by its path segments.
pub fn detect_family(url: &str) -> UrlPatternFamily {
    let Ok(parsed) = Url::parse(url) else {
        return UrlPatternFamily::SingleListing;
    };
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    for seg in &segments {
        if seg.len() == 2 && seg.chars().all(|c| c.is_ascii_digit()) {
            let code: u8 = seg.parse().unwrap_or(0);
            if (1..=47).contains(&code) {
                return UrlPatternFamily::RegionCode;
            }
        }
    }
    for seg in &segments {
        if PREFECTURE_ROMAJI.iter().any(|(romaji, _)| romaji == seg) {
            return UrlPatternFamily::RomanizedRegion;
        }
    }
    if segments
        .iter()
        .any(|seg| seg.len() >= 3 && seg.chars().all(|c| c.is_ascii_digit()))
    {
        return UrlPatternFamily::StoreId;
    }
    UrlPatternFamily::SingleListing
}

/// Enumerate sibling region URLs from one example. A `/shop/tokyo/`
/// seed yields all 47 prefecture variants (the seed itself included);
/// families without a region component yield just the input.
pub fn expand_family(url: &str) -> Vec<String> {
    match detect_family(url) {
        UrlPatternFamily::RegionCode => {
            let re = Regex::new(r"/(0[1-9]|[1-3][0-9]|4[0-7])(/|$)").expect("valid regex");
            (1..=47u8)
                .map(|code| {
                    re.replace(url, format!("/{code:02}$2").as_str())
                        .into_owned()
                })
                .collect()
        }
        UrlPatternFamily::RomanizedRegion => {
            let seed = PREFECTURE_ROMAJI.iter().map(|(r, _)| *r).find(|r| {
                url.contains(&format!("/{r}/")) || url.ends_with(&format!("/{r}"))
            });
            let Some(seed) = seed else {
                return vec![url.to_string()];
            };
            PREFECTURE_ROMAJI
                .iter()
                .map(|(romaji, _)| {
                    if url.contains(&format!("/{seed}/")) {
                        url.replace(&format!("/{seed}/"), &format!("/{romaji}/"))
                    } else {
                        format!("{}{romaji}", url.trim_end_matches(seed))
                    }
                })
                .collect()
        }
        _ => vec![url.to_string()],
    }
}

/// Canonical form for visited-set membership: lowercased scheme/host,
/// no fragment, no tracking params, no trailing slash.
pub fn normalize_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.trim().to_string();
    };
    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && k != "fbclid" && k != "gclid")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    let mut out = parsed.to_string();
    if out.ends_with('/') && parsed.path() != "/" {
        out.pop();
    }
    out
}

/// Per-company crawl budget: visited-set dedup plus a hard page cap.
/// Shared across tasks, so the counters are interior.
pub struct CrawlController {
    visited: Mutex<HashSet<String>>,
    pages: AtomicUsize,
    max_pages: usize,
}

impl CrawlController {
    pub fn new(max_pages: usize) -> Self {
        Self {
            visited: Mutex::new(HashSet::new()),
            pages: AtomicUsize::new(0),
            max_pages,
        }
    }

    /// Claim a visit slot for `url`. False when the page was already
    /// visited or the budget is spent; true commits the visit.
    pub fn try_visit(&self, url: &str) -> bool {
        let normalized = normalize_url(url);
        let mut visited = self.visited.lock().expect("visited lock poisoned");
        if visited.contains(&normalized) {
            return false;
        }
        if self.pages.load(Ordering::Acquire) >= self.max_pages {
            return false;
        }
        visited.insert(normalized);
        self.pages.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn pages_visited(&self) -> usize {
        self.pages.load(Ordering::Acquire)
    }

    pub fn budget_left(&self) -> bool {
        self.pages.load(Ordering::Acquire) < self.max_pages
    }
}

/// Links worth following from a listing page, resolved against the
/// page URL. Store-page path patterns first, then anchor-text
/// keywords.
pub fn discover_listing_links(html: &str, page_url: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse(page_url).ok();

    let mut links = Vec::new();
    let mut seen = HashSet::new();

    for anchor in doc.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else { continue };
        if href.starts_with('#') || href.starts_with("tel:") || href.starts_with("mailto:") {
            continue;
        }
        let text: String = anchor.text().collect();
        let matches_path = STORE_PAGE_PATTERNS.iter().any(|p| href.contains(p));
        let matches_text = LISTING_KEYWORDS.iter().any(|k| text.contains(k));
        if !matches_path && !matches_text {
            continue;
        }

        let resolved = match Url::parse(href) {
            Ok(url) => url.to_string(),
            Err(_) => match base.as_ref().and_then(|b| b.join(href).ok()) {
                Some(url) => url.to_string(),
                None => continue,
            },
        };
        // Stay on the company's site.
        if let (Some(base), Ok(link)) = (base.as_ref(), Url::parse(&resolved)) {
            if link.host_str() != base.host_str() {
                continue;
            }
        }
        let normalized = normalize_url(&resolved);
        if seen.insert(normalized) {
            links.push(resolved);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_canonicalizes() {
        assert_eq!(
            normalize_url("HTTPS://Example.co.jp/Shop/?utm_source=x&utm_campaign=y#list"),
            "https://example.co.jp/Shop"
        );
        assert_eq!(
            normalize_url("https://example.co.jp/shop?pref=13&fbclid=abc"),
            "https://example.co.jp/shop?pref=13"
        );
        assert_eq!(
            normalize_url("https://example.co.jp/"),
            "https://example.co.jp/"
        );
    }

    #[test]
    fn controller_dedupes_and_caps() {
        let crawl = CrawlController::new(3);
        assert!(crawl.try_visit("https://example.co.jp/shop/"));
        // Same page, different dressing.
        assert!(!crawl.try_visit("https://example.co.jp/shop?utm_source=x"));
        assert!(crawl.budget_left());
        assert!(crawl.try_visit("https://example.co.jp/shop/tokyo/"));
        assert!(crawl.try_visit("https://example.co.jp/shop/osaka/"));
        assert!(!crawl.budget_left());
        assert!(!crawl.try_visit("https://example.co.jp/shop/chiba/"));
        assert_eq!(crawl.pages_visited(), 3);
    }

    #[test]
    fn family_detection() {
        assert_eq!(
            detect_family("https://example.co.jp/shop/pref/13/"),
            UrlPatternFamily::RegionCode
        );
        assert_eq!(
            detect_family("https://example.co.jp/shop/tokyo/"),
            UrlPatternFamily::RomanizedRegion
        );
        assert_eq!(
            detect_family("https://example.co.jp/shop/detail/1042/"),
            UrlPatternFamily::StoreId
        );
        assert_eq!(
            detect_family("https://example.co.jp/shoplist.html"),
            UrlPatternFamily::SingleListing
        );
    }

    #[test]
    fn region_code_family_expands_to_47() {
        let urls = expand_family("https://example.co.jp/shop/pref/13/");
        assert_eq!(urls.len(), 47);
        assert!(urls.contains(&"https://example.co.jp/shop/pref/01/".to_string()));
        assert!(urls.contains(&"https://example.co.jp/shop/pref/47/".to_string()));
    }

    #[test]
    fn romaji_family_expands_to_47() {
        let urls = expand_family("https://example.co.jp/shop/tokyo/");
        assert_eq!(urls.len(), 47);
        assert!(urls.contains(&"https://example.co.jp/shop/hokkaido/".to_string()));
        assert!(urls.contains(&"https://example.co.jp/shop/okinawa/".to_string()));
    }

    #[test]
    fn single_listing_expands_to_itself() {
        let urls = expand_family("https://example.co.jp/shoplist.html");
        assert_eq!(urls, vec!["https://example.co.jp/shoplist.html".to_string()]);
    }

    #[test]
    fn listing_links_stay_on_site() {
        let html = r#"
            <a href="/shop/tokyo/">東京の店舗</a>
            <a href="https://other.example.com/shop/">他社店舗</a>
            <a href="/company/">会社概要</a>
            <a href="/access/">アクセス</a>
        "#;
        let links = discover_listing_links(html, "https://example.co.jp/");
        assert_eq!(
            links,
            vec![
                "https://example.co.jp/shop/tokyo/".to_string(),
                "https://example.co.jp/access/".to_string(),
            ]
        );
    }
}
