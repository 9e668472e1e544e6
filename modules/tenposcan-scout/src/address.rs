//! Address recovery from listing markup.
//!
//! Store cards rarely put the whole address in one element. The 〒
//! postal marker is the anchor: find the deepest element carrying it,
//! then climb ancestors until the accumulated text reads like a full
//! address. Works over a minimal DOM view so the logic is testable
//! without a real document.

use regex::Regex;
use scraper::ElementRef;

use tenposcan_common::region;

/// How many ancestor levels to climb from the postal marker before
/// giving up. Deeper than this and the text pulls in unrelated cards.
const MAX_CLIMB: usize = 3;

const MAX_ADDRESS_CHARS: usize = 100;

/// Class-name vocabulary that marks address containers when no postal
/// marker exists in the card.
const ADDRESS_CLASS_HINTS: [&str; 5] = ["address", "addr", "access", "location", "jusho"];

/// The slice of DOM behavior address recovery needs. Implemented for
/// [`scraper::ElementRef`]; tests use a lighter stand-in.
pub trait DomNode: Copy {
    fn parent(&self) -> Option<Self>;
    fn next_sibling_element(&self) -> Option<Self>;
    fn child_elements(&self) -> Vec<Self>;
    fn text_content(&self) -> String;
    fn class_attr(&self) -> Option<&str>;
}

impl<'a> DomNode for ElementRef<'a> {
    fn parent(&self) -> Option<Self> {
        (**self).parent().and_then(ElementRef::wrap)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        (**self).next_siblings().find_map(ElementRef::wrap)
    }

    fn child_elements(&self) -> Vec<Self> {
        (**self).children().filter_map(ElementRef::wrap).collect()
    }

    fn text_content(&self) -> String {
        self.text().collect::<Vec<_>>().join(" ")
    }

    fn class_attr(&self) -> Option<&str> {
        self.value().attr("class")
    }
}

/// Recover a cleaned address from a store card.
pub fn recover<N: DomNode>(card: N) -> Option<String> {
    if let Some(marker) = deepest_with_marker(card) {
        // Climb until the postal code and a prefecture appear together.
        let mut node = marker;
        for _ in 0..=MAX_CLIMB {
            let text = node.text_content();
            if looks_like_address(&text) {
                return Some(clean(&text));
            }
            match node.parent() {
                Some(parent) => node = parent,
                None => break,
            }
        }

        // Markup like `<span>〒100-0001</span><span>東京都...</span>`
        // splits the address across siblings.
        if let Some(sibling) = marker.next_sibling_element() {
            let combined = format!("{} {}", marker.text_content(), sibling.text_content());
            if looks_like_address(&combined) {
                return Some(clean(&combined));
            }
        }

        // The marker alone may still carry a usable address.
        let text = marker.text_content();
        if region::prefecture_token(&text).is_some() {
            return Some(clean(&text));
        }
    }

    // No postal marker anywhere: fall back to class-name vocabulary.
    class_hint_fallback(card)
}

/// Deepest descendant (or the card itself) whose text contains 〒.
fn deepest_with_marker<N: DomNode>(node: N) -> Option<N> {
    if !node.text_content().contains('〒') {
        return None;
    }
    for child in node.child_elements() {
        if let Some(found) = deepest_with_marker(child) {
            return Some(found);
        }
    }
    Some(node)
}

fn class_hint_fallback<N: DomNode>(node: N) -> Option<String> {
    if let Some(class) = node.class_attr() {
        let class = class.to_lowercase();
        if ADDRESS_CLASS_HINTS.iter().any(|h| class.contains(h)) {
            let text = node.text_content();
            if region::prefecture_token(&text).is_some() {
                return Some(clean(&text));
            }
        }
    }
    node.child_elements()
        .into_iter()
        .find_map(class_hint_fallback)
}

/// Full-address test: a postal code with a prefecture name following
/// close behind (the order they appear on store pages).
pub fn looks_like_address(text: &str) -> bool {
    let postal = Regex::new(r"〒?\s*\d{3}-?\d{4}").expect("valid regex");
    let Some(m) = postal.find(text) else {
        return false;
    };
    match region::prefecture_token(&text[m.end()..]) {
        Some((_, offset)) => offset <= 40,
        None => false,
    }
}

/// Normalize a raw address fragment: start at the postal marker (or
/// the prefecture if there is none), cut trailing phone/hours noise,
/// collapse whitespace, and cap the length.
pub fn clean(raw: &str) -> String {
    let start = raw
        .find('〒')
        .or_else(|| region::prefecture_token(raw).map(|(_, pos)| pos))
        .unwrap_or(0);
    let mut text = &raw[start..];

    // Phone numbers and opening-hours labels follow the address in the
    // same container; everything from the first one onward is noise.
    // The phone shape requires a leading 0 so block numbers like
    // 1-2-3 survive.
    let terminator =
        Regex::new(r"(TEL|Tel|tel|FAX|Fax|fax|電話|営業時間|営業|定休日|定休|0\d{1,3}-\d{2,4}-\d{3,4})")
            .expect("valid regex");
    if let Some(m) = terminator.find(text) {
        text = &text[..m.start()];
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_ADDRESS_CHARS).collect();
    capped.trim().to_string()
}
