//! French phone numbers: cleanup, national formatting, and discovery in free text.

use once_cell::sync::Lazy;
use regex::Regex;

static PHONE_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+33\s?|0033\s?|\b0)[1-9](?:[\s.\-]?\d{2}){4}\b")
        .expect("phone pattern should be valid")
});

/// Keep digits and `+`, rewrite `+33`/`0033` to a leading `0`, and format
/// ten-digit national numbers as `01 23 45 67 89`.
///
/// Returns `None` when fewer than 9 or more than 13 characters remain.
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    let national = if let Some(rest) = cleaned.strip_prefix("+33") {
        format!("0{rest}")
    } else if let Some(rest) = cleaned.strip_prefix("0033") {
        format!("0{rest}")
    } else {
        cleaned
    };

    if !(9..=13).contains(&national.len()) {
        return None;
    }
    if national.len() == 10 && national.starts_with('0') && !national.contains('+') {
        let pairs: Vec<&str> = (0..10).step_by(2).map(|i| &national[i..i + 2]).collect();
        return Some(pairs.join(" "));
    }
    Some(national)
}

/// 06 / 07 numbers, in any spacing.
pub fn is_mobile(phone: &str) -> bool {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    digits.len() == 10 && (digits.starts_with("06") || digits.starts_with("07"))
}

/// First French number found in `text`, normalized.
pub fn find_in_text(text: &str) -> Option<String> {
    PHONE_IN_TEXT
        .find_iter(text)
        .find_map(|m| normalize(m.as_str()))
}
