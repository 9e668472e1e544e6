//! Store-listing extraction pipeline.
//!
//! Given a company and a seed URL, walks the company's store-locator
//! pages and extracts per-branch listings through a three-tier cascade:
//! static HTML parsing, headless-browser rendering, and finally model
//! inference over page evidence. Cheaper tiers run first; a tier's
//! output is accepted when any record clears the quality threshold.

pub mod address;
pub mod cache;
pub mod crawler;
pub mod enrichment;
pub mod extractor;
pub mod fetch;
pub mod inference;
pub mod investigator;
pub mod pool;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use investigator::{Investigator, TierState};
pub use fetch::{PageScraper, RenderedFetcher, StaticFetcher};
