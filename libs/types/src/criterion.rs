//! Match criteria
//!
//! A criterion is one (difficulty, language, topic) tuple a user is willing to
//! practice. Two requests are compatible when their criteria sets share at
//! least one structurally equal criterion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Question difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single (difficulty, language, topic) tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Criterion {
    pub difficulty: Difficulty,
    pub language: String,
    pub topic: String,
}

impl Criterion {
    pub fn new(difficulty: Difficulty, language: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            difficulty,
            language: language.into(),
            topic: topic.into(),
        }
    }

    /// Canonical string form: `difficulty|language|topic`
    ///
    /// Two criteria are equal iff their canonical keys are equal.
    pub fn canonical_key(&self) -> String {
        format!("{}|{}|{}", self.difficulty, self.language, self.topic)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.difficulty, self.language, self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criterion_wire_format() {
        let c = Criterion::new(Difficulty::Easy, "JavaScript", "Array");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"difficulty": "easy", "language": "JavaScript", "topic": "Array"})
        );
    }

    #[test]
    fn test_canonical_key_distinguishes_fields() {
        let a = Criterion::new(Difficulty::Easy, "Python", "Graph");
        let b = Criterion::new(Difficulty::Hard, "Python", "Graph");
        assert_ne!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key(), "easy|Python|Graph");
    }

    #[test]
    fn test_unknown_difficulty_rejected() {
        let result: Result<Criterion, _> = serde_json::from_str(
            r#"{"difficulty":"extreme","language":"Go","topic":"Heap"}"#,
        );
        assert!(result.is_err());
    }
}
