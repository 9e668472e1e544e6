//! Record completeness scoring.
//!
//! The score drives two decisions: whether a tier's output is good
//! enough to stop escalating, and whether an emitted record is flagged
//! for manual review. It is a pure function of the record's fields, so
//! recomputing after enrichment is always safe, and filling in a field
//! can only raise it.

use crate::region;
use crate::types::StoreRecord;

/// Name present and at least two characters.
pub const WEIGHT_NAME: f32 = 0.20;
/// Address present and containing a prefecture token.
pub const WEIGHT_ADDRESS_FULL: f32 = 0.35;
/// Address present but postal-code-only. Strictly below
/// [`WEIGHT_ADDRESS_FULL`] so completing the address raises the score.
pub const WEIGHT_ADDRESS_POSTAL_ONLY: f32 = 0.10;
/// Phone present with a plausible digit count.
pub const WEIGHT_PHONE: f32 = 0.20;
/// Region resolved.
pub const WEIGHT_REGION: f32 = 0.25;

/// A tier whose best record scores at or above this is accepted;
/// otherwise the pipeline escalates to the next tier.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f32 = 0.5;

const MIN_NAME_CHARS: usize = 2;
const PHONE_DIGITS_MIN: usize = 9;
const PHONE_DIGITS_MAX: usize = 11;

/// Completeness score in [0, 1].
pub fn score(record: &StoreRecord) -> f32 {
    let mut total = 0.0;

    if record.name.trim().chars().count() >= MIN_NAME_CHARS {
        total += WEIGHT_NAME;
    }

    let address = record.address.trim();
    if !address.is_empty() {
        if region::prefecture_token(address).is_some() {
            total += WEIGHT_ADDRESS_FULL;
        } else {
            total += WEIGHT_ADDRESS_POSTAL_ONLY;
        }
    }

    let phone_digits = record.phone.chars().filter(|c| c.is_ascii_digit()).count();
    if (PHONE_DIGITS_MIN..=PHONE_DIGITS_MAX).contains(&phone_digits) {
        total += WEIGHT_PHONE;
    }

    if !record.region.trim().is_empty() {
        total += WEIGHT_REGION;
    }

    total.clamp(0.0, 1.0)
}
