//! Inference result formatting.

use std::fmt;

use crate::tensor::argmax;

/// One class and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub class: usize,
    pub score: f32,
}

/// Scores paired with their class index, in class-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    entries: Vec<ScoreEntry>,
}

/// Pair every score with its class index. Order is `0..scores.len()`, never by score.
pub fn format(scores: &[f32]) -> Ranking {
    Ranking {
        entries: scores
            .iter()
            .enumerate()
            .map(|(class, &score)| ScoreEntry { class, score })
            .collect(),
    }
}

impl Ranking {
    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    /// Highest-scoring entry; the lowest class index wins ties.
    pub fn best(&self) -> Option<ScoreEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let scores: Vec<f32> = self.entries.iter().map(|e| e.score).collect();
        Some(self.entries[argmax(&scores)])
    }
}

impl fmt::Display for Ranking {
    /// One `"{class} : {score:.2}"` line per entry.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} : {:.2}", entry.class, entry.score)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_class_order_and_two_decimals() {
        let ranking = format(&[0.05, 0.9, 0.001, 0.049]);
        let classes: Vec<usize> = ranking.entries().iter().map(|e| e.class).collect();
        assert_eq!(classes, vec![0, 1, 2, 3]);
        assert_eq!(ranking.to_string(), "0 : 0.05\n1 : 0.90\n2 : 0.00\n3 : 0.05\n");
        assert_eq!(ranking.best().map(|e| e.class), Some(1));
    }

    #[test]
    fn formatting_is_idempotent() {
        let scores = [0.1, 0.2, 0.3, 0.4, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(format(&scores), format(&scores));
        assert_eq!(format(&scores).to_string(), format(&scores).to_string());
    }

    #[test]
    fn empty_scores() {
        let ranking = format(&[]);
        assert!(ranking.best().is_none());
        assert_eq!(ranking.to_string(), "");
    }
}
