//! Line-pattern reading for pages that print each candidate as one run of
//! text (`[CATEGORY] NUMBER FIRSTNAME LASTNAME DECISION`) with no column
//! geometry to anchor on.

use super::RawTable;
use once_cell::sync::Lazy;
use regex::Regex;

pub const HEADERS: [&str; 5] = ["categorie", "numero_candidat", "prenom", "nom", "decision"];

static CATEGORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(TAXIS?|VTC|VMDTR)\b\s*").expect("category pattern should be valid")
});

static CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^([A-Z0-9]+)\s+(\p{L}[\p{L}' -]*?)\s+(NON[- ]ADMISSIBLE|ADMISSIBLE|REFUS[EÉ]|AJOURN[EÉ]|ABSENTE?)$",
    )
    .expect("candidate pattern should be valid")
});

static TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)cat[eé]gorie|r[eé]sultats").expect("title pattern should be valid")
});

/// Read candidate lines; the category is sticky until the next one appears.
/// Returns `None` when no line matched.
pub fn parse_lines<'a>(lines: impl IntoIterator<Item = &'a str>, page: u32) -> Option<RawTable> {
    let mut category: Option<String> = None;
    let mut rows = Vec::new();

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() || TITLE.is_match(line) {
            continue;
        }

        let mut rest = line;
        if let Some(caps) = CATEGORY.captures(line) {
            category = Some(caps[1].to_uppercase());
            rest = &line[caps[0].len()..];
        }
        let Some(cat) = category.as_deref() else {
            continue;
        };
        if let Some(row) = parse_candidate(rest, cat) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return None;
    }
    Some(RawTable {
        page,
        index: 0,
        headers: HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    })
}

fn parse_candidate(line: &str, category: &str) -> Option<Vec<String>> {
    let caps = CANDIDATE.captures(line.trim())?;
    let mut names = caps[2].split_whitespace();
    let first = names.next()?.to_string();
    let last = names.collect::<Vec<_>>().join(" ");
    Some(vec![
        category.to_string(),
        caps[1].to_string(),
        first,
        last,
        caps[3].to_uppercase(),
    ])
}
