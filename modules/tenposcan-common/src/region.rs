//! Postal-prefix → prefecture resolution.
//!
//! Japanese postal codes partition cleanly by their first three digits:
//! every prefix in 001–999 maps to exactly one of the 47 prefectures.
//! The table is compiled in as range arms, so it is immutable by
//! construction and needs no startup loading.

use regex::Regex;

/// All 47 prefectures in JIS X 0401 order (code = index + 1).
pub const PREFECTURES: [&str; 47] = [
    "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県",
    "茨城県", "栃木県", "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県",
    "新潟県", "富山県", "石川県", "福井県", "山梨県", "長野県", "岐阜県",
    "静岡県", "愛知県", "三重県", "滋賀県", "京都府", "大阪府", "兵庫県",
    "奈良県", "和歌山県", "鳥取県", "島根県", "岡山県", "広島県", "山口県",
    "徳島県", "香川県", "愛媛県", "高知県", "福岡県", "佐賀県", "長崎県",
    "熊本県", "大分県", "宮崎県", "鹿児島県", "沖縄県",
];

/// Romanized prefecture path segments as they appear in store-locator
/// URLs (`/shop/tokyo/`), paired with the prefecture name. Same order
/// as [`PREFECTURES`].
pub const PREFECTURE_ROMAJI: [(&str, &str); 47] = [
    ("hokkaido", "北海道"), ("aomori", "青森県"), ("iwate", "岩手県"),
    ("miyagi", "宮城県"), ("akita", "秋田県"), ("yamagata", "山形県"),
    ("fukushima", "福島県"), ("ibaraki", "茨城県"), ("tochigi", "栃木県"),
    ("gunma", "群馬県"), ("saitama", "埼玉県"), ("chiba", "千葉県"),
    ("tokyo", "東京都"), ("kanagawa", "神奈川県"), ("niigata", "新潟県"),
    ("toyama", "富山県"), ("ishikawa", "石川県"), ("fukui", "福井県"),
    ("yamanashi", "山梨県"), ("nagano", "長野県"), ("gifu", "岐阜県"),
    ("shizuoka", "静岡県"), ("aichi", "愛知県"), ("mie", "三重県"),
    ("shiga", "滋賀県"), ("kyoto", "京都府"), ("osaka", "大阪府"),
    ("hyogo", "兵庫県"), ("nara", "奈良県"), ("wakayama", "和歌山県"),
    ("tottori", "鳥取県"), ("shimane", "島根県"), ("okayama", "岡山県"),
    ("hiroshima", "広島県"), ("yamaguchi", "山口県"), ("tokushima", "徳島県"),
    ("kagawa", "香川県"), ("ehime", "愛媛県"), ("kochi", "高知県"),
    ("fukuoka", "福岡県"), ("saga", "佐賀県"), ("nagasaki", "長崎県"),
    ("kumamoto", "熊本県"), ("oita", "大分県"), ("miyazaki", "宮崎県"),
    ("kagoshima", "鹿児島県"), ("okinawa", "沖縄県"),
];

/// Prefecture name for a three-digit postal prefix. Complete over
/// 001–999; 000 is not a valid prefix.
pub fn prefecture_for_prefix(prefix: u16) -> Option<&'static str> {
    let name = match prefix {
        1..=9 => "北海道",
        10..=19 => "秋田県",
        20..=29 => "岩手県",
        30..=39 => "青森県",
        40..=99 => "北海道",
        100..=209 => "東京都",
        210..=259 => "神奈川県",
        260..=299 => "千葉県",
        300..=319 => "茨城県",
        320..=329 => "栃木県",
        330..=369 => "埼玉県",
        370..=379 => "群馬県",
        380..=399 => "長野県",
        400..=409 => "山梨県",
        410..=439 => "静岡県",
        440..=499 => "愛知県",
        500..=509 => "岐阜県",
        510..=519 => "三重県",
        520..=529 => "滋賀県",
        530..=599 => "大阪府",
        600..=629 => "京都府",
        630..=639 => "奈良県",
        640..=649 => "和歌山県",
        650..=679 => "兵庫県",
        680..=689 => "鳥取県",
        690..=699 => "島根県",
        700..=719 => "岡山県",
        720..=739 => "広島県",
        740..=759 => "山口県",
        760..=769 => "香川県",
        770..=779 => "徳島県",
        780..=789 => "高知県",
        790..=799 => "愛媛県",
        800..=839 => "福岡県",
        840..=849 => "佐賀県",
        850..=859 => "長崎県",
        860..=869 => "熊本県",
        870..=879 => "大分県",
        880..=889 => "宮崎県",
        890..=899 => "鹿児島県",
        900..=909 => "沖縄県",
        910..=919 => "福井県",
        920..=929 => "石川県",
        930..=939 => "富山県",
        940..=959 => "新潟県",
        960..=979 => "福島県",
        980..=989 => "宮城県",
        990..=999 => "山形県",
        _ => return None,
    };
    Some(name)
}

/// Resolve a postal code to a prefecture name.
///
/// Tolerates the 〒 marker, hyphens, and surrounding whitespace.
/// Accepts partial codes: two leading digits are enough where the
/// two-digit bucket is unambiguous (it almost always is; the 00x
/// block is the exception and needs the third digit).
pub fn resolve_postal(input: &str) -> Option<&'static str> {
    let digits: String = input
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(3)
        .collect();

    match digits.len() {
        3 => prefecture_for_prefix(digits.parse().ok()?),
        2 => {
            let bucket: u16 = digits.parse().ok()?;
            let lo = prefecture_for_prefix(bucket * 10)?;
            let hi = prefecture_for_prefix(bucket * 10 + 9)?;
            // Range arms all start and end on decade boundaries, so
            // matching endpoints mean the whole bucket agrees.
            (lo == hi).then_some(lo)
        }
        _ => None,
    }
}

/// Find a postal code embedded in free text and return it in
/// normalized `NNN-NNNN` form.
pub fn postal_code_in(text: &str) -> Option<String> {
    let re = Regex::new(r"〒?\s*(\d{3})-?(\d{4})").expect("valid regex");
    let caps = re.captures(text)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

/// Find the first prefecture name appearing in `text`, returning the
/// full name and its byte offset. Short forms without the 都/道/府/県
/// suffix also match when at least two characters long.
pub fn prefecture_token(text: &str) -> Option<(&'static str, usize)> {
    let mut best: Option<(&'static str, usize)> = None;

    for pref in PREFECTURES {
        if let Some(pos) = text.find(pref) {
            if best.is_none_or(|(_, p)| pos < p) {
                best = Some((pref, pos));
            }
        }
    }
    if best.is_some() {
        return best;
    }

    for pref in PREFECTURES {
        let short = pref
            .trim_end_matches(['都', '道', '府', '県']);
        if short.chars().count() < 2 {
            continue;
        }
        if let Some(pos) = text.find(short) {
            if best.is_none_or(|(_, p)| pos < p) {
                best = Some((pref, pos));
            }
        }
    }
    best
}

/// Prefecture name for a text fragment: direct name match first, then
/// postal-code inference.
pub fn prefecture_for_text(text: &str) -> Option<&'static str> {
    if text.is_empty() {
        return None;
    }
    if let Some((pref, _)) = prefecture_token(text) {
        return Some(pref);
    }
    postal_code_in(text).and_then(|code| resolve_postal(&code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_valid_prefix_maps_to_one_prefecture() {
        for prefix in 1u16..=999 {
            let pref = prefecture_for_prefix(prefix);
            assert!(pref.is_some(), "prefix {prefix:03} unmapped");
            assert!(PREFECTURES.contains(&pref.unwrap()));
        }
    }

    #[test]
    fn all_47_prefectures_are_reachable() {
        let reachable: std::collections::HashSet<_> =
            (1u16..=999).filter_map(prefecture_for_prefix).collect();
        assert_eq!(reachable.len(), 47);
    }

    #[test]
    fn representative_codes() {
        assert_eq!(resolve_postal("060-0000"), Some("北海道"));
        assert_eq!(resolve_postal("100-0001"), Some("東京都"));
        assert_eq!(resolve_postal("530-0001"), Some("大阪府"));
        assert_eq!(resolve_postal("900-0000"), Some("沖縄県"));
        assert_eq!(resolve_postal("999-0000"), Some("山形県"));
    }

    #[test]
    fn boundary_prefixes() {
        assert_eq!(resolve_postal("009-0000"), Some("北海道"));
        assert_eq!(resolve_postal("010-0000"), Some("秋田県"));
        assert_eq!(resolve_postal("209-0000"), Some("東京都"));
        assert_eq!(resolve_postal("210-0000"), Some("神奈川県"));
        assert_eq!(resolve_postal("909-0000"), Some("沖縄県"));
        assert_eq!(resolve_postal("910-0000"), Some("福井県"));
    }

    #[test]
    fn marker_and_hyphen_noise_is_ignored() {
        assert_eq!(resolve_postal("〒100-0001"), Some("東京都"));
        assert_eq!(resolve_postal("〒 530-0001"), Some("大阪府"));
        assert_eq!(resolve_postal("1000001"), Some("東京都"));
        assert_eq!(resolve_postal("  260-0852  "), Some("千葉県"));
    }

    #[test]
    fn unmapped_prefix_returns_none() {
        assert_eq!(resolve_postal("000-0000"), None);
        assert_eq!(resolve_postal(""), None);
        assert_eq!(resolve_postal("東京都渋谷区"), None);
    }

    #[test]
    fn two_digit_prefix_resolves_when_unambiguous() {
        assert_eq!(resolve_postal("10"), Some("東京都"));
        assert_eq!(resolve_postal("26"), Some("千葉県"));
        // 00x spans invalid 000, so two digits are not enough here.
        assert_eq!(resolve_postal("00"), None);
    }

    #[test]
    fn postal_code_in_text() {
        assert_eq!(
            postal_code_in("〒150-0001 東京都渋谷区").as_deref(),
            Some("150-0001")
        );
        assert_eq!(postal_code_in("1500001").as_deref(), Some("150-0001"));
        assert_eq!(postal_code_in("渋谷区"), None);
    }

    #[test]
    fn prefecture_token_prefers_earliest_match() {
        let (pref, pos) = prefecture_token("大阪府と東京都").unwrap();
        assert_eq!(pref, "大阪府");
        assert_eq!(pos, 0);
    }

    #[test]
    fn prefecture_token_matches_short_form() {
        assert_eq!(prefecture_token("神奈川で営業中").map(|(p, _)| p), Some("神奈川県"));
    }

    #[test]
    fn prefecture_for_text_falls_back_to_postal() {
        assert_eq!(prefecture_for_text("〒980-0021 青葉区中央1-1"), Some("宮城県"));
        assert_eq!(prefecture_for_text("本日のニュース"), None);
    }
}
