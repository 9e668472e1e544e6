//! Structural extraction of store records from page HTML.
//!
//! Parsing is synchronous on purpose: [`scraper::Html`] is not `Send`,
//! so the document never crosses an await point. Callers fetch first,
//! then hand the string over.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use tenposcan_common::{normalize_phone, region, FetchError, StoreRecord, Strategy};

use crate::address;

/// Class-name fragments that mark a store card container.
const CARD_CLASS_HINTS: [&str; 8] = [
    "shop", "store", "tenpo", "item", "card", "result", "location", "branch",
];

/// URL path fragments that identify store detail pages.
pub const STORE_PAGE_PATTERNS: [&str; 8] = [
    "/shop/", "/store/", "/school/", "/classroom/", "/tenpo/",
    "/shoplist", "/storelist", "/access",
];

/// Link texts that are navigation chrome, not store names.
const NOISE_NAMES: [&str; 8] = [
    "一覧", "検索", "ログイン", "お知らせ", "ホーム", "サイトマップ", "もっと見る", "詳細はこちら",
];

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 50;

/// Extract store records from listing HTML.
///
/// Cascade within the page: class-hinted cards first, then a
/// single-store reading of the whole page, then bare store-page links.
/// Empty input is a parse failure, not an empty result, so the caller
/// can tell "nothing there" from "nothing fetched".
pub fn extract_records(
    html: &str,
    company: &str,
    page_url: &str,
    strategy: Strategy,
    threshold: f32,
) -> Result<Vec<StoreRecord>, FetchError> {
    if html.trim().is_empty() {
        return Err(FetchError::Parse(format!("empty document from {page_url}")));
    }
    let doc = Html::parse_document(html);

    let mut records = extract_from_cards(&doc, company, page_url, strategy, threshold);
    if records.is_empty() {
        if let Some(single) = extract_single_store(&doc, company, page_url, strategy, threshold) {
            records.push(single);
        }
    }
    if records.is_empty() {
        records = extract_from_links(&doc, company, page_url, strategy, threshold);
    }

    debug!(
        url = page_url,
        scraper = strategy.as_str(),
        count = records.len(),
        "extracted records"
    );
    Ok(records)
}

/// Visible text of a page, whitespace-collapsed. Evidence for the
/// inference tier.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let body_sel = Selector::parse("body").expect("valid selector");
    match doc.select(&body_sel).next() {
        Some(body) => card_text(body),
        None => normalize_text(html),
    }
}

fn card_selector() -> Selector {
    let parts: Vec<String> = ["div", "article", "li", "section"]
        .iter()
        .flat_map(|tag| {
            CARD_CLASS_HINTS
                .iter()
                .map(move |hint| format!("{tag}[class*={hint}]"))
        })
        .collect();
    Selector::parse(&parts.join(", ")).expect("valid selector")
}

fn extract_from_cards(
    doc: &Html,
    company: &str,
    page_url: &str,
    strategy: Strategy,
    threshold: f32,
) -> Vec<StoreRecord> {
    let selector = card_selector();
    let mut records = Vec::new();
    let mut seen: Vec<(String, String)> = Vec::new();

    for card in doc.select(&selector) {
        let Some(name) = card_name(card) else { continue };
        if is_noise_name(&name) {
            continue;
        }

        let mut record = StoreRecord::new(company, strategy);
        record.name = name;
        record.address = address::recover(card).unwrap_or_default();
        record.postal_code = region::postal_code_in(&record.address)
            .or_else(|| region::postal_code_in(&card_text(card)))
            .unwrap_or_default();
        record.region = region::prefecture_for_text(&record.address)
            .or_else(|| region::resolve_postal(&record.postal_code))
            .map(String::from)
            .unwrap_or_default();
        record.phone = card_phone(card);
        record.business_hours = card_hours(card);
        record.detail_url = detail_url(card, page_url);
        record.source_url = record
            .detail_url
            .clone()
            .unwrap_or_else(|| page_url.to_string());
        record.rescore(threshold);

        if !record.is_valid() {
            continue;
        }
        // Nested containers produce the same store twice.
        let key = (record.name.clone(), record.address.clone());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        records.push(record);
    }
    records
}

/// A detail page describes one store: the heading carries a 「○○店」
/// name and the body holds a single address block.
fn extract_single_store(
    doc: &Html,
    company: &str,
    page_url: &str,
    strategy: Strategy,
    threshold: f32,
) -> Option<StoreRecord> {
    let heading_sel = Selector::parse("h1, h2, title").expect("valid selector");
    let name_re = Regex::new(r"([^\s「」|｜>・]{1,20}(?:店|支店|営業所|教室|校))").expect("valid regex");

    let name = doc
        .select(&heading_sel)
        .filter_map(|h| {
            let text = normalize_text(&h.text().collect::<Vec<_>>().join(" "));
            name_re.captures(&text).map(|c| c[1].to_string())
        })
        .next()?;
    if is_noise_name(&name) {
        return None;
    }

    let body_sel = Selector::parse("body").expect("valid selector");
    let body = doc.select(&body_sel).next()?;
    let body_text = card_text(body);

    let mut record = StoreRecord::new(company, strategy);
    record.name = name;
    record.address = address::recover(body).unwrap_or_default();
    record.postal_code = region::postal_code_in(&body_text).unwrap_or_default();
    record.region = region::prefecture_for_text(&record.address)
        .or_else(|| region::resolve_postal(&record.postal_code))
        .map(String::from)
        .unwrap_or_default();
    record.phone = card_phone(body);
    record.business_hours = card_hours(body);
    record.source_url = page_url.to_string();
    record.rescore(threshold);

    record.is_valid().then_some(record)
}

/// Last resort: the page is only an index of links to per-store pages.
/// Records carry a name and a detail URL for a later crawl, nothing
/// more, so they always land below the acceptance threshold.
fn extract_from_links(
    doc: &Html,
    company: &str,
    page_url: &str,
    strategy: Strategy,
    threshold: f32,
) -> Vec<StoreRecord> {
    let anchor_sel = Selector::parse("a[href]").expect("valid selector");
    let mut records = Vec::new();
    let mut seen_names = Vec::new();

    for anchor in doc.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else { continue };
        if !STORE_PAGE_PATTERNS.iter().any(|p| href.contains(p)) {
            continue;
        }
        let name = normalize_text(&anchor.text().collect::<Vec<_>>().join(" "));
        let chars = name.chars().count();
        if chars < MIN_NAME_CHARS || chars > MAX_NAME_CHARS || is_noise_name(&name) {
            continue;
        }
        if seen_names.contains(&name) {
            continue;
        }
        seen_names.push(name.clone());

        let mut record = StoreRecord::new(company, strategy);
        record.name = name;
        record.detail_url = Some(join_url(page_url, href).unwrap_or_else(|| href.to_string()));
        record.source_url = record.detail_url.clone().unwrap_or_default();
        record.rescore(threshold);
        records.push(record);
    }
    records
}

fn card_name(card: ElementRef<'_>) -> Option<String> {
    let selectors = [
        "h2", "h3", "h4",
        "[class*=name]", "[class*=title]", "dt",
    ];
    for sel in selectors {
        let selector = Selector::parse(sel).expect("valid selector");
        if let Some(el) = card.select(&selector).next() {
            let text = normalize_text(&el.text().collect::<Vec<_>>().join(" "));
            let chars = text.chars().count();
            if (MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&chars) {
                return Some(text);
            }
        }
    }
    None
}

fn card_phone(card: ElementRef<'_>) -> String {
    let tel_sel = Selector::parse(r#"a[href^="tel:"]"#).expect("valid selector");
    if let Some(a) = card.select(&tel_sel).next() {
        if let Some(href) = a.value().attr("href") {
            let normalized = normalize_phone(href.trim_start_matches("tel:"));
            if !normalized.is_empty() {
                return normalized;
            }
        }
    }
    let phone_re = Regex::new(r"0\d{1,3}[-\(]\d{2,4}[-\)]\d{3,4}").expect("valid regex");
    phone_re
        .find(&card_text(card))
        .map(|m| normalize_phone(m.as_str()))
        .unwrap_or_default()
}

fn card_hours(card: ElementRef<'_>) -> String {
    let hours_re =
        Regex::new(r"(?:営業時間|受付時間)[:：]?\s*([0-9０-９時分:：〜~\-ー、\s]{3,30})").expect("valid regex");
    hours_re
        .captures(&card_text(card))
        .map(|c| normalize_text(&c[1]))
        .unwrap_or_default()
}

fn detail_url(card: ElementRef<'_>, page_url: &str) -> Option<String> {
    let anchor_sel = Selector::parse("a[href]").expect("valid selector");
    for anchor in card.select(&anchor_sel) {
        let href = anchor.value().attr("href")?;
        if href.starts_with("tel:") || href.starts_with('#') {
            continue;
        }
        if STORE_PAGE_PATTERNS.iter().any(|p| href.contains(p)) {
            return join_url(page_url, href);
        }
    }
    None
}

fn join_url(base: &str, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string()),
    }
}

fn card_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_noise_name(name: &str) -> bool {
    NOISE_NAMES.iter().any(|n| name.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
        <div class="shop-list">
          <div class="shop-item">
            <h3>千代田店</h3>
            <p><span>〒100-0001</span><span>東京都千代田区千代田1-1</span></p>
            <a href="tel:03-1234-5678">03-1234-5678</a>
            <a href="/shop/chiyoda/">店舗詳細</a>
          </div>
          <div class="shop-item">
            <h3>横浜店</h3>
            <p><span>〒220-0011</span><span>神奈川県横浜市西区高島2-2 営業時間 10:00〜19:00</span></p>
          </div>
          <div class="shop-item">
            <h3>店舗検索</h3>
          </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn cards_become_records() {
        let records =
            extract_records(LISTING, "テスト商事", "https://example.co.jp/shop/", Strategy::Static, 0.5)
                .unwrap();
        assert_eq!(records.len(), 2);

        let chiyoda = &records[0];
        assert_eq!(chiyoda.name, "千代田店");
        assert_eq!(chiyoda.postal_code, "100-0001");
        assert_eq!(chiyoda.region, "東京都");
        assert!(chiyoda.address.contains("千代田区"));
        assert_eq!(chiyoda.phone, "03-1234-5678");
        assert_eq!(chiyoda.source_url, "https://example.co.jp/shop/chiyoda/");
        assert_eq!(
            chiyoda.detail_url.as_deref(),
            Some("https://example.co.jp/shop/chiyoda/")
        );
        assert!(!chiyoda.needs_review);

        let yokohama = &records[1];
        assert_eq!(yokohama.region, "神奈川県");
        // No detail link: provenance points at the listing page, but
        // the record carries no URL of its own.
        assert_eq!(yokohama.source_url, "https://example.co.jp/shop/");
        assert_eq!(yokohama.detail_url, None);
        assert!(
            !yokohama.address.contains("営業時間"),
            "hours leaked into address: {}",
            yokohama.address
        );
    }

    #[test]
    fn nested_cards_do_not_duplicate() {
        // shop-list itself matches the card selector; the inner card's
        // store must come out once.
        let records =
            extract_records(LISTING, "テスト商事", "https://example.co.jp/shop/", Strategy::Static, 0.5)
                .unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names, deduped);
    }

    #[test]
    fn single_store_page_fallback() {
        let html = r#"
            <html><head><title>梅田店 | テスト商事</title></head><body>
            <h1>梅田店</h1>
            <p>〒530-0001 大阪府大阪市北区梅田2-2 TEL 06-1111-2222</p>
            </body></html>
        "#;
        let records =
            extract_records(html, "テスト商事", "https://example.co.jp/shop/umeda/", Strategy::Static, 0.5)
                .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "梅田店");
        assert_eq!(records[0].region, "大阪府");
        assert_eq!(records[0].phone, "06-1111-2222");
    }

    #[test]
    fn link_index_fallback_flags_for_review() {
        let html = r#"
            <html><body>
            <ul>
              <li><a href="/shop/sapporo/">札幌店</a></li>
              <li><a href="/shop/sendai/">仙台店</a></li>
              <li><a href="/company/">会社概要</a></li>
              <li><a href="/shop/">店舗一覧</a></li>
            </ul>
            </body></html>
        "#;
        let records =
            extract_records(html, "テスト商事", "https://example.co.jp/", Strategy::Static, 0.5).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.needs_review));
        assert_eq!(records[0].source_url, "https://example.co.jp/shop/sapporo/");
    }

    #[test]
    fn empty_html_is_a_parse_error() {
        let err = extract_records("  ", "c", "https://example.co.jp/", Strategy::Static, 0.5)
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn rendered_strategy_is_carried_through() {
        let records =
            extract_records(LISTING, "テスト商事", "https://example.co.jp/shop/", Strategy::Rendered, 0.5)
                .unwrap();
        assert!(records.iter().all(|r| r.strategy_used == Strategy::Rendered));
    }
}
