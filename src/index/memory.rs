//! In-process fallback index.
//!
//! Brute-force cosine scan over a guarded map. Correct but unindexed; used
//! when the remote similarity-search service is unreachable at startup so
//! the system degrades instead of failing.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::RwLock;

use super::{FragmentPayload, ScopeFilter, SearchHit};
use crate::core::errors::RagError;
use crate::vector_math::cosine_similarity;

struct StoredPoint {
    vector: Vec<f32>,
    payload: FragmentPayload,
    /// Insertion sequence, used as a stable tiebreak for equal scores.
    seq: u64,
}

pub struct MemoryIndex {
    points: RwLock<HashMap<String, StoredPoint>>,
    next_seq: AtomicU64,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub async fn upsert(&self, id: &str, vector: Vec<f32>, payload: FragmentPayload) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let mut points = self.points.write().await;
        points.insert(
            id.to_string(),
            StoredPoint {
                vector,
                payload,
                seq,
            },
        );
    }

    /// Returns whether the id was present.
    pub async fn delete(&self, id: &str) -> bool {
        let mut points = self.points.write().await;
        points.remove(id).is_some()
    }

    /// Returns the number of removed points.
    pub async fn delete_by_filter(&self, filter: &ScopeFilter) -> usize {
        let mut points = self.points.write().await;
        let before = points.len();
        points.retain(|_, point| !filter.matches(&point.payload));
        before - points.len()
    }

    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>, RagError> {
        let points = self.points.read().await;

        let mut scored: Vec<(f32, u64, FragmentPayload)> = Vec::new();
        for point in points.values() {
            if !filter.matches(&point.payload) {
                continue;
            }
            let score = cosine_similarity(query_vector, &point.vector)?;
            scored.push((score, point.seq, point.payload.clone()));
        }

        scored.sort_by(|left, right| {
            right
                .0
                .partial_cmp(&left.0)
                .unwrap_or(Ordering::Equal)
                .then(left.1.cmp(&right.1))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, _, payload)| SearchHit { payload, score })
            .collect())
    }

    pub async fn count(&self) -> usize {
        self.points.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(file_id: &str, collection: Option<&str>) -> FragmentPayload {
        FragmentPayload {
            text: format!("text of {}", file_id),
            file_id: file_id.to_string(),
            file_name: format!("{}.pdf", file_id),
            chunk_index: 0,
            collection_id: collection.map(str::to_string),
            website_id: None,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let index = MemoryIndex::new();
        index.upsert("a", vec![0.9, 0.1], payload("a", None)).await;
        index.upsert("b", vec![0.1, 0.9], payload("b", None)).await;
        index.upsert("c", vec![1.0, 0.0], payload("c", None)).await;

        let hits = index
            .search(&[1.0, 0.0], 10, &ScopeFilter::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].payload.file_id, "c");
        assert_eq!(hits[2].payload.file_id, "b");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_insertion_order() {
        let index = MemoryIndex::new();
        index.upsert("x2", vec![1.0, 0.0], payload("x2", None)).await;
        index.upsert("x1", vec![1.0, 0.0], payload("x1", None)).await;

        let hits = index
            .search(&[1.0, 0.0], 10, &ScopeFilter::default())
            .await
            .unwrap();
        assert_eq!(hits[0].payload.file_id, "x2");
        assert_eq!(hits[1].payload.file_id, "x1");
    }

    #[tokio::test]
    async fn scoped_search_never_leaks_other_collections() {
        let index = MemoryIndex::new();
        index
            .upsert("a", vec![1.0, 0.0], payload("a", Some("c1")))
            .await;
        index
            .upsert("b", vec![1.0, 0.0], payload("b", Some("c2")))
            .await;
        index.upsert("c", vec![1.0, 0.0], payload("c", None)).await;

        let hits = index
            .search(&[1.0, 0.0], 10, &ScopeFilter::collection("c2"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.file_id, "b");
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let index = MemoryIndex::new();
        for i in 0..5 {
            index
                .upsert(&format!("id{}", i), vec![1.0, 0.0], payload(&format!("f{}", i), None))
                .await;
        }

        let hits = index
            .search(&[1.0, 0.0], 2, &ScopeFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn delete_restores_population() {
        let index = MemoryIndex::new();
        assert_eq!(index.count().await, 0);

        index.upsert("a", vec![1.0, 0.0], payload("a", None)).await;
        assert_eq!(index.count().await, 1);

        assert!(index.delete("a").await);
        assert_eq!(index.count().await, 0);
        // Idempotent: deleting again is a no-op.
        assert!(!index.delete("a").await);

        let hits = index
            .search(&[1.0, 0.0], 10, &ScopeFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_filter_removes_whole_file() {
        let index = MemoryIndex::new();
        index
            .upsert("a0", vec![1.0, 0.0], payload("f1", Some("c1")))
            .await;
        index
            .upsert("a1", vec![0.0, 1.0], payload("f1", Some("c1")))
            .await;
        index
            .upsert("b0", vec![1.0, 0.0], payload("f2", Some("c1")))
            .await;

        let removed = index.delete_by_filter(&ScopeFilter::file("f1")).await;
        assert_eq!(removed, 2);
        assert_eq!(index.count().await, 1);
    }
}
