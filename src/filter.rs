//! Keep the rows whose decision reads ADMISSIBLE.

use crate::normalize::{NormalizedRecord, RecordSet};
use tracing::{debug, warn};

pub const DECISION_KEYWORD: &str = "decision";
pub const ADMISSIBLE: &str = "ADMISSIBLE";

/// First key, in header order, whose name contains "decision".
pub fn decision_key(keys: &[String]) -> Option<&str> {
    keys.iter()
        .map(String::as_str)
        .find(|k| k.to_lowercase().contains(DECISION_KEYWORD))
}

/// Exact match after trimming and upper-casing; no fuzziness on the value.
pub fn is_admissible(value: &str) -> bool {
    value.trim().to_uppercase() == ADMISSIBLE
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Kept {
        decision_key: String,
        records: Vec<NormalizedRecord>,
    },
    /// The table has no decision column; nothing can be kept.
    NoDecisionColumn,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdmissibleFilter;

impl AdmissibleFilter {
    pub fn apply(&self, set: RecordSet) -> FilterOutcome {
        let Some(key) = decision_key(set.keys()).map(str::to_string) else {
            warn!(
                page = set.page,
                table = set.table,
                keys = ?set.keys(),
                "no decision column; table contributes no candidates"
            );
            return FilterOutcome::NoDecisionColumn;
        };

        let (page, table, total) = (set.page, set.table, set.len());
        let records: Vec<NormalizedRecord> = set
            .into_records()
            .into_iter()
            .filter(|r| r.get(&key).is_some_and(is_admissible))
            .collect();

        debug!(page, table, decision_key = %key, kept = records.len(), total, "table filtered");
        FilterOutcome::Kept {
            decision_key: key,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extract::RawTable, normalize::normalize_table};

    fn set(headers: &[&str], rows: &[&[&str]]) -> RecordSet {
        normalize_table(&RawTable {
            page: 1,
            index: 0,
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        })
    }

    fn kept(outcome: FilterOutcome) -> (String, Vec<NormalizedRecord>) {
        match outcome {
            FilterOutcome::Kept {
                decision_key,
                records,
            } => (decision_key, records),
            FilterOutcome::NoDecisionColumn => panic!("expected a decision column"),
        }
    }

    #[test]
    fn keeps_only_exact_admissible_values() {
        let (key, records) = kept(AdmissibleFilter.apply(set(
            &["nom", "Décision"],
            &[
                &["A", "ADMISSIBLE"],
                &["B", " admissible "],
                &["C", "NON-ADMISSIBLE"],
                &["D", "REFUSE"],
                &["E", ""],
                &["F", "ADMISSIBLE (sous réserve)"],
                &["G"],
            ],
        )));
        assert_eq!(key, "decision");
        let names: Vec<&str> = records.iter().filter_map(|r| r.get("nom")).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn first_matching_column_wins() {
        let (key, records) = kept(AdmissibleFilter.apply(set(
            &["nom", "Date décision", "Décision"],
            &[&["A", "ADMISSIBLE", "REFUSE"], &["B", "2024-01-15", "ADMISSIBLE"]],
        )));
        assert_eq!(key, "date_decision");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("nom"), Some("A"));
    }

    #[test]
    fn missing_decision_column_keeps_nothing() {
        let outcome = AdmissibleFilter.apply(set(&["nom", "resultat"], &[&["A", "ADMISSIBLE"]]));
        assert_eq!(outcome, FilterOutcome::NoDecisionColumn);
    }

    #[test]
    fn key_lookup_ignores_case() {
        let keys = vec!["Nom".to_string(), "DECISION_FINALE".to_string()];
        assert_eq!(decision_key(&keys), Some("DECISION_FINALE"));
        assert_eq!(decision_key(&[]), None);
    }
}
