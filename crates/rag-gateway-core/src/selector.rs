//! Cosine similarity selection over the corpus index.

use thiserror::Error;

use crate::corpus::Dataset;
use crate::documents::DocumentId;

/// A candidate paired with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored<T> {
    pub item: T,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("query has dimension {query} but dataset {id} has dimension {dataset}")]
    DimensionMismatch {
        id: DocumentId,
        query: usize,
        dataset: usize,
    },
}

/// Cosine similarity of two equal-length vectors, accumulated in f64.
///
/// A zero-norm side scores 0.0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Pick the dataset most similar to `query`.
///
/// Scans in corpus order and only replaces the current best on a strictly
/// greater score, so ties resolve to the earliest entry. NaN ranks below every
/// real score.
/// An empty corpus yields `None`.
pub fn select_best<'a>(
    corpus: &'a [Dataset],
    query: &[f32],
) -> Result<Option<Scored<&'a Dataset>>, SelectionError> {
    let mut best: Option<Scored<&'a Dataset>> = None;
    for dataset in corpus {
        if dataset.embedding.len() != query.len() {
            return Err(SelectionError::DimensionMismatch {
                id: dataset.id.clone(),
                query: query.len(),
                dataset: dataset.embedding.len(),
            });
        }
        let score = cosine_similarity(query, &dataset.embedding);
        let score = if score.is_nan() { f64::NEG_INFINITY } else { score };
        match best {
            Some(current) if score <= current.score => {}
            _ => {
                best = Some(Scored {
                    item: dataset,
                    score,
                })
            }
        }
    }
    Ok(best)
}

/// Like [`select_best`], but drops a winner scoring below `floor`.
pub fn select_above<'a>(
    corpus: &'a [Dataset],
    query: &[f32],
    floor: Option<f32>,
) -> Result<Option<Scored<&'a Dataset>>, SelectionError> {
    let best = select_best(corpus, query)?;
    Ok(match floor {
        Some(floor) => best.filter(|scored| scored.score >= f64::from(floor)),
        None => best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset(id: &str, embedding: Vec<f32>) -> Dataset {
        Dataset {
            id: DocumentId::new(id),
            embedding,
        }
    }

    fn best_id(corpus: &[Dataset], query: &[f32]) -> Option<String> {
        select_best(corpus, query)
            .expect("select")
            .map(|scored| scored.item.id.to_string())
    }

    #[test]
    fn identical_direction_scores_one() {
        let score = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn opposite_direction_scores_minus_one() {
        let score = cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]);
        assert!((score + 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn picks_highest_similarity() {
        let corpus = vec![
            dataset("a", vec![1.0, 0.0]),
            dataset("b", vec![0.0, 1.0]),
            dataset("c", vec![1.0, 1.0]),
        ];
        assert_eq!(best_id(&corpus, &[0.1, 0.9]), Some("b".to_string()));
        assert_eq!(best_id(&corpus, &[1.0, 1.0]), Some("c".to_string()));
    }

    #[test]
    fn ties_go_to_earliest_entry() {
        let corpus = vec![
            dataset("first", vec![1.0, 0.0]),
            dataset("second", vec![2.0, 0.0]),
            dataset("third", vec![1.0, 0.0]),
        ];
        assert_eq!(best_id(&corpus, &[5.0, 0.0]), Some("first".to_string()));
    }

    #[test]
    fn all_zero_corpus_returns_first_entry() {
        let corpus = vec![dataset("a", vec![0.0, 0.0]), dataset("b", vec![0.0, 0.0])];
        let best = select_best(&corpus, &[1.0, 0.0]).expect("select").expect("some");
        assert_eq!(best.item.id.as_str(), "a");
        assert_eq!(best.score, 0.0);
    }

    #[test]
    fn negative_scores_still_produce_a_winner() {
        let corpus = vec![dataset("a", vec![-1.0, 0.0]), dataset("b", vec![-1.0, -1.0])];
        assert_eq!(best_id(&corpus, &[1.0, 0.0]), Some("b".to_string()));
    }

    #[test]
    fn nan_scores_never_win() {
        let corpus = vec![
            dataset("nan", vec![f32::NAN, 1.0]),
            dataset("ok", vec![-1.0, 0.0]),
        ];
        assert_eq!(best_id(&corpus, &[1.0, 0.0]), Some("ok".to_string()));
    }

    #[test]
    fn empty_corpus_selects_nothing() {
        assert_eq!(select_best(&[], &[1.0, 0.0]).expect("select"), None);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let corpus = vec![dataset("a", vec![1.0, 0.0]), dataset("b", vec![1.0])];
        let err = select_best(&corpus, &[1.0, 0.0]).unwrap_err();
        assert_eq!(
            err,
            SelectionError::DimensionMismatch {
                id: DocumentId::new("b"),
                query: 2,
                dataset: 1,
            }
        );
    }

    #[test]
    fn floor_drops_weak_winner() {
        let corpus = vec![dataset("a", vec![1.0, 1.0])];
        let weak = select_above(&corpus, &[1.0, 0.0], Some(0.9)).expect("select");
        assert_eq!(weak, None);
        let kept = select_above(&corpus, &[1.0, 0.0], Some(0.5)).expect("select");
        assert_eq!(kept.map(|scored| scored.item.id.as_str()), Some("a"));
    }
}
