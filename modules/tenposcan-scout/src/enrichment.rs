//! Detail-page enrichment for thin records.
//!
//! Listing pages often truncate the address to ward level. When a
//! record carries its own detail URL, one extra static fetch usually
//! recovers the full street address. Enrichment only ever takes the
//! static fetcher; a thin address is not worth a render or an
//! inference call.

use scraper::{Html, Selector};
use tracing::{debug, warn};

use tenposcan_common::{region, StoreRecord};

use crate::address;
use crate::fetch::PageScraper;

/// Addresses shorter than this are assumed truncated. Prefecture plus
/// ward alone sits under it; anything with a block number clears it.
const MIN_ADDRESS_CHARS: usize = 8;

/// Only records with their own detail page qualify. `source_url` may
/// point at the shared listing page, and an address picked up there
/// could belong to a sibling store.
pub fn needs_enrichment(record: &StoreRecord) -> bool {
    record.address.chars().count() < MIN_ADDRESS_CHARS && record.detail_url.is_some()
}

/// Try to complete a record's address from its detail page. Failures
/// leave the record untouched; this pass can only add.
pub async fn enrich(record: &mut StoreRecord, fetcher: &dyn PageScraper, threshold: f32) {
    if !needs_enrichment(record) {
        return;
    }
    let Some(url) = record.detail_url.clone() else {
        return;
    };

    let html = match fetcher.fetch(&url).await {
        Ok(html) => html,
        Err(e) => {
            debug!(url = %url, error = %e, "enrichment fetch failed");
            return;
        }
    };

    let Some(found) = address_from_page(&html) else {
        debug!(url = %url, "no address on detail page");
        return;
    };
    if found.chars().count() <= record.address.chars().count() {
        return;
    }

    debug!(store = %record.name, address = %found, "address enriched");
    record.address = found;
    if let Some(postal) = region::postal_code_in(&record.address) {
        record.postal_code = postal;
    }
    if let Some(pref) = region::prefecture_for_text(&record.address) {
        record.region = pref.to_string();
    }
    record.rescore(threshold);
}

/// Enrich every thin record in place, sequentially. The detail pages
/// belong to one site, so fanning out would just trip rate limits.
pub async fn enrich_all(records: &mut [StoreRecord], fetcher: &dyn PageScraper, threshold: f32) {
    let thin = records.iter().filter(|r| needs_enrichment(r)).count();
    if thin == 0 {
        return;
    }
    debug!(count = thin, "enriching thin records");
    for record in records.iter_mut() {
        enrich(record, fetcher, threshold).await;
    }
    let still_thin = records.iter().filter(|r| needs_enrichment(r)).count();
    if still_thin > 0 {
        warn!(count = still_thin, "records still thin after enrichment");
    }
}

fn address_from_page(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let body_sel = Selector::parse("body").expect("valid selector");
    let body = doc.select(&body_sel).next()?;
    address::recover(body)
}
