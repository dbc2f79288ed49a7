use leadboard_core::{SchemaError, Stage};
use serde::Serialize;
use tracing::warn;

use crate::join::JoinedTable;
use crate::leads::{leads, stage_subset};

pub const DEFAULT_DUPLICATE_THRESHOLD: u8 = 98;
pub const PERFECT_SCORE: u8 = 100;

/// Above this many comparisons the pairwise scan gets slow enough to notice.
pub const COMPARISON_BUDGET: usize = 250_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NearDuplicate {
    pub name_a: String,
    pub name_b: String,
    pub score: u8,
}

/// Insertion/deletion similarity of the trimmed names on a 0-100 scale:
/// `2 * lcs / (len_a + len_b)`, counted in chars. Blank names score 0.
pub fn similarity(a: &str, b: &str) -> u8 {
    let a = a.trim().chars().collect::<Vec<_>>();
    let b = b.trim().chars().collect::<Vec<_>>();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let ratio = (2 * longest_common_subsequence(&a, &b)) as f64 / (a.len() + b.len()) as f64;
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Scores every (a, b) pair and keeps those strictly above `threshold`.
/// Exact matches are always kept, so a threshold of 100 still surfaces them.
pub fn find_near_duplicates<A, B>(list_a: &[A], list_b: &[B], threshold: u8) -> Vec<NearDuplicate>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let comparisons = list_a.len().saturating_mul(list_b.len());
    if comparisons > COMPARISON_BUDGET {
        warn!(
            comparisons,
            budget = COMPARISON_BUDGET,
            "near-duplicate scan exceeds comparison budget"
        );
    }

    let mut matches = Vec::new();
    for a in list_a {
        for b in list_b {
            let score = similarity(a.as_ref(), b.as_ref());
            if score > threshold || score == PERFECT_SCORE {
                matches.push(NearDuplicate {
                    name_a: a.as_ref().to_string(),
                    name_b: b.as_ref().to_string(),
                    score,
                });
            }
        }
    }
    matches
}

/// Near-duplicate names between the leads of two stages of one selection
/// process (typically partially enrolled vs enrolled).
pub fn stage_near_duplicates(
    joined: &JoinedTable,
    selection_process: &str,
    stage_a: Stage,
    stage_b: Stage,
    threshold: u8,
) -> Result<Vec<NearDuplicate>, SchemaError> {
    let names = |stage: Stage| -> Result<Vec<String>, SchemaError> {
        let subset = stage_subset(joined, selection_process, stage)?;
        Ok(leads(&subset)?.into_iter().map(|lead| lead.name).collect())
    };
    let a = names(stage_a)?;
    let b = names(stage_b)?;
    Ok(find_near_duplicates(&a, &b, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::join;
    use leadboard_core::{ColumnMapping, Table};

    #[test]
    fn trailing_whitespace_is_a_perfect_match() {
        let found = find_near_duplicates(&["Ana Silva"], &["Ana Silva "], 98);
        assert_eq!(
            found,
            vec![NearDuplicate {
                name_a: "Ana Silva".into(),
                name_b: "Ana Silva ".into(),
                score: 100
            }]
        );
    }

    #[test]
    fn empty_left_list_yields_nothing() {
        let empty: [&str; 0] = [];
        assert!(find_near_duplicates(&empty, &["Ana", "Bruno"], 0).is_empty());
    }

    #[test]
    fn identical_lists_match_every_identical_pair_at_threshold_100() {
        let names = ["Ana Silva", "Bruno Costa", "Carla Dias"];
        let found = find_near_duplicates(&names, &names, 100);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|m| m.score == 100 && m.name_a == m.name_b));
    }

    #[test]
    fn threshold_is_strict() {
        // one substitution in 50 characters scores exactly 98
        let a = "a".repeat(50);
        let b = format!("{}b", "a".repeat(49));
        assert_eq!(similarity(&a, &b), 98);
        assert!(find_near_duplicates(&[a.as_str()], &[b.as_str()], 98).is_empty());
        assert_eq!(find_near_duplicates(&[a.as_str()], &[b.as_str()], 97).len(), 1);
    }

    #[test]
    fn one_extra_letter_on_a_long_name_clears_the_default_threshold() {
        let base = "Maria Aparecida dos Santos Oliveira Pereira e Silva";
        assert_eq!(base.chars().count(), 51);
        let longer = format!("{base}a");
        assert_eq!(similarity(base, &longer), 99);
        let found = find_near_duplicates(&[base], &[longer.as_str()], DEFAULT_DUPLICATE_THRESHOLD);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].score, 99);
    }

    #[test]
    fn similarity_counts_shared_subsequence_over_both_lengths() {
        // lcs("Ana Sousa", "Ana Souza") = 8 over 18 chars
        assert_eq!(similarity("Ana Sousa", "Ana Souza"), 89);
        assert_eq!(similarity("abc", "xyz"), 0);
        assert_eq!(similarity(" Bruno ", "Bruno"), 100);
    }

    #[test]
    fn blank_names_never_match() {
        assert_eq!(similarity("  ", ""), 0);
        assert!(find_near_duplicates(&[" "], &[" "], 0).is_empty());
    }

    #[test]
    fn order_follows_left_then_right_list() {
        let found = find_near_duplicates(&["Ana", "Bia"], &["Bia", "Ana"], 98);
        let pairs = found
            .iter()
            .map(|m| (m.name_a.as_str(), m.name_b.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![("Ana", "Ana"), ("Bia", "Bia")]);
    }

    #[test]
    fn stage_scan_compares_partial_against_enrolled() {
        let contacts = Table::from_rows(
            vec!["id".into(), "nome".into()],
            vec![
                vec![Some("1".into()), Some("Ana Silva".into())],
                vec![Some("2".into()), Some("Ana Silva ".into())],
                vec![Some("3".into()), Some("Bruno Costa".into())],
            ],
        );
        let registrations = Table::from_rows(
            vec!["pessoa".into(), "processoSeletivoNome".into(), "etapaNome".into()],
            vec![
                vec![Some("1".into()), Some("PS".into()), Some("Inscrito".into())],
                vec![Some("2".into()), Some("PS".into()), Some("Inscrito parcial".into())],
                vec![Some("3".into()), Some("PS".into()), Some("Inscrito parcial".into())],
            ],
        );
        let joined = join(&contacts, &registrations, &ColumnMapping::default()).expect("join");
        let found = stage_near_duplicates(
            &joined,
            "PS",
            Stage::PartiallyEnrolled,
            Stage::Enrolled,
            DEFAULT_DUPLICATE_THRESHOLD,
        )
        .expect("scan");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].score, 100);
    }
}
