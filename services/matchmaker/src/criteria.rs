//! Criteria matching
//!
//! Pure functions deciding whether two criteria sets are compatible and which
//! criterion a matched pair agrees on. No I/O.

use std::collections::HashSet;
use types::criterion::Criterion;
use types::errors::ValidationError;

/// Maximum number of distinct criteria per request
pub const MAX_CRITERIA: usize = 3;

/// True iff at least one criterion appears in both sets
pub fn has_intersection(a: &[Criterion], b: &[Criterion]) -> bool {
    let keys: HashSet<String> = a.iter().map(Criterion::canonical_key).collect();
    b.iter().any(|c| keys.contains(&c.canonical_key()))
}

/// First criterion of `a` (in insertion order) that also appears in `b`
pub fn pick_common(a: &[Criterion], b: &[Criterion]) -> Option<Criterion> {
    let keys: HashSet<String> = b.iter().map(Criterion::canonical_key).collect();
    a.iter().find(|c| keys.contains(&c.canonical_key())).cloned()
}

/// Validate client criteria and collapse duplicates, keeping first occurrence
pub fn normalize(criteria: Vec<Criterion>) -> Result<Vec<Criterion>, ValidationError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(criteria.len());

    for c in criteria {
        if c.language.trim().is_empty() {
            return Err(ValidationError::BlankField { field: "language" });
        }
        if c.topic.trim().is_empty() {
            return Err(ValidationError::BlankField { field: "topic" });
        }
        if seen.insert(c.canonical_key()) {
            out.push(c);
        }
    }

    if out.is_empty() {
        return Err(ValidationError::EmptyCriteria);
    }
    if out.len() > MAX_CRITERIA {
        return Err(ValidationError::TooManyCriteria {
            count: out.len(),
            max: MAX_CRITERIA,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use types::criterion::Difficulty;

    fn c(d: Difficulty, lang: &str, topic: &str) -> Criterion {
        Criterion::new(d, lang, topic)
    }

    #[test]
    fn test_intersection_on_shared_criterion() {
        let a = vec![c(Difficulty::Easy, "JS", "Array"), c(Difficulty::Hard, "Go", "Graph")];
        let b = vec![c(Difficulty::Hard, "Go", "Graph")];
        assert!(has_intersection(&a, &b));
    }

    #[test]
    fn test_no_intersection_when_one_field_differs() {
        let a = vec![c(Difficulty::Easy, "JS", "Array")];
        let b = vec![c(Difficulty::Easy, "JS", "String")];
        assert!(!has_intersection(&a, &b));
        assert!(pick_common(&a, &b).is_none());
    }

    #[test]
    fn test_pick_common_follows_first_set_order() {
        let a = vec![
            c(Difficulty::Medium, "Rust", "Tree"),
            c(Difficulty::Easy, "JS", "Array"),
        ];
        let b = vec![
            c(Difficulty::Easy, "JS", "Array"),
            c(Difficulty::Medium, "Rust", "Tree"),
        ];
        assert_eq!(pick_common(&a, &b), Some(c(Difficulty::Medium, "Rust", "Tree")));
        assert_eq!(pick_common(&b, &a), Some(c(Difficulty::Easy, "JS", "Array")));
    }

    #[test]
    fn test_normalize_dedups_preserving_order() {
        let input = vec![
            c(Difficulty::Easy, "JS", "Array"),
            c(Difficulty::Hard, "Go", "Graph"),
            c(Difficulty::Easy, "JS", "Array"),
        ];
        let out = normalize(input).unwrap();
        assert_eq!(
            out,
            vec![c(Difficulty::Easy, "JS", "Array"), c(Difficulty::Hard, "Go", "Graph")]
        );
    }

    #[test]
    fn test_normalize_rejects_empty_and_oversized() {
        assert_eq!(normalize(vec![]), Err(ValidationError::EmptyCriteria));

        let four = vec![
            c(Difficulty::Easy, "JS", "A"),
            c(Difficulty::Easy, "JS", "B"),
            c(Difficulty::Easy, "JS", "C"),
            c(Difficulty::Easy, "JS", "D"),
        ];
        assert_eq!(
            normalize(four),
            Err(ValidationError::TooManyCriteria { count: 4, max: 3 })
        );
    }

    #[test]
    fn test_normalize_rejects_blank_fields() {
        let result = normalize(vec![c(Difficulty::Easy, "  ", "Array")]);
        assert_eq!(result, Err(ValidationError::BlankField { field: "language" }));
    }

    fn arb_criterion() -> impl Strategy<Value = Criterion> {
        (
            prop_oneof![Just(Difficulty::Easy), Just(Difficulty::Medium), Just(Difficulty::Hard)],
            prop_oneof![Just("JS"), Just("Python"), Just("Rust")],
            prop_oneof![Just("Array"), Just("Graph"), Just("Tree")],
        )
            .prop_map(|(d, l, t)| Criterion::new(d, l, t))
    }

    proptest! {
        #[test]
        fn intersection_is_symmetric(
            a in prop::collection::vec(arb_criterion(), 0..4),
            b in prop::collection::vec(arb_criterion(), 0..4),
        ) {
            prop_assert_eq!(has_intersection(&a, &b), has_intersection(&b, &a));
        }

        #[test]
        fn pick_common_agrees_with_intersection(
            a in prop::collection::vec(arb_criterion(), 0..4),
            b in prop::collection::vec(arb_criterion(), 0..4),
        ) {
            let common = pick_common(&a, &b);
            prop_assert_eq!(common.is_some(), has_intersection(&a, &b));
            if let Some(found) = common {
                prop_assert!(a.contains(&found) && b.contains(&found));
            }
        }
    }
}
