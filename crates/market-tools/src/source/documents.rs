//! In-Memory Document Index
//!
//! Keyword search over page-sized chunks. A chunk's relevance is the share
//! of distinct query terms it contains.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::DocumentSource;
use crate::error::{MarketError, Result};
use crate::model::{Document, DocumentChunk};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on", "or", "the",
    "to", "was", "what", "with",
];

/// Lower-cased distinct terms of a text, stop words removed
fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

struct IndexedChunk {
    chunk: DocumentChunk,
    terms: BTreeSet<String>,
}

/// Document index held in memory
#[derive(Default)]
pub struct InMemoryDocumentIndex {
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryDocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index preloaded with sample annual report excerpts
    pub fn with_sample_filings() -> Self {
        let mut chunks = Vec::new();
        for document in sample_filings() {
            chunks.extend(Self::split(&document));
        }
        Self {
            chunks: RwLock::new(chunks),
        }
    }

    /// Add a document; every page becomes one chunk
    pub async fn add_document(&self, document: &Document) {
        let indexed = Self::split(document);
        tracing::debug!(document_id = %document.document_id, chunks = indexed.len(), "Indexed document");
        self.chunks.write().await.extend(indexed);
    }

    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.len()
    }

    fn split(document: &Document) -> Vec<IndexedChunk> {
        document
            .pages
            .iter()
            .zip(1u32..)
            .map(|(page, number)| IndexedChunk {
                terms: terms(page),
                chunk: DocumentChunk {
                    document_id: document.document_id.clone(),
                    chunk_id: format!("{}-p{}", document.document_id, number),
                    content: page.clone(),
                    relevance_score: 0.0,
                    page_number: Some(number),
                },
            })
            .collect()
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentIndex {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<DocumentChunk>> {
        let wanted = terms(query);
        if wanted.is_empty() {
            return Err(MarketError::InvalidQuery("query has no searchable terms".into()));
        }

        #[allow(clippy::cast_precision_loss)]
        let total = wanted.len() as f64;

        let chunks = self.chunks.read().await;
        let mut hits: Vec<DocumentChunk> = chunks
            .iter()
            .filter_map(|indexed| {
                let matched = wanted.intersection(&indexed.terms).count();
                (matched > 0).then(|| {
                    #[allow(clippy::cast_precision_loss)]
                    let score = matched as f64 / total;
                    DocumentChunk {
                        relevance_score: score,
                        ..indexed.chunk.clone()
                    }
                })
            })
            .collect();

        // Stable sort keeps index order among equal scores
        hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        hits.truncate(max_results);
        Ok(hits)
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

fn sample_filings() -> Vec<Document> {
    vec![
        Document {
            document_id: "northwind-10k-2023".into(),
            title: "Northwind Retail Inc. Annual Report 2023".into(),
            pages: vec![
                "Net sales increased 12% to $574.8 billion in 2023, compared with $514.0 billion in 2022. \
                 North America segment sales increased 12% and International segment sales increased 11%."
                    .into(),
                "Operating income increased to $36.9 billion in 2023, compared with $12.2 billion in 2022. \
                 Cloud services segment operating income was $24.6 billion."
                    .into(),
                "Free cash flow improved to an inflow of $36.8 billion for the trailing twelve months, \
                 driven by lower capital expenditures on fulfillment network expansion."
                    .into(),
                "Risk factors include intense competition, foreign exchange fluctuations, supply chain \
                 disruption and regulatory scrutiny of our marketplace practices."
                    .into(),
            ],
        },
        Document {
            document_id: "northwind-10q-2024q1".into(),
            title: "Northwind Retail Inc. Quarterly Report Q1 2024".into(),
            pages: vec![
                "Net sales increased 13% to $143.3 billion in the first quarter, compared with $127.4 billion \
                 in the first quarter of 2023."
                    .into(),
                "Cloud services segment sales increased 17% year-over-year to $25.0 billion. \
                 Advertising services revenue grew 24%."
                    .into(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ranks_by_matched_terms() {
        let index = InMemoryDocumentIndex::with_sample_filings();
        let hits = index.search("cloud services operating income", 5).await.unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "northwind-10k-2023-p2");
        assert!((hits[0].relevance_score - 1.0).abs() < f64::EPSILON);
        assert!(hits.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.relevance_score)));
    }

    #[tokio::test]
    async fn test_limits_and_empty_results() {
        let index = InMemoryDocumentIndex::with_sample_filings();
        assert_eq!(index.search("net sales increased", 1).await.unwrap().len(), 1);
        assert!(index.search("cryptocurrency mining", 5).await.unwrap().is_empty());
        assert!(matches!(index.search("the of and", 5).await, Err(MarketError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_add_document() {
        let index = InMemoryDocumentIndex::new();
        index
            .add_document(&Document {
                document_id: "memo".into(),
                title: "Memo".into(),
                pages: vec!["Dividend policy unchanged".into(), "Buyback authorized".into()],
            })
            .await;

        assert_eq!(index.chunk_count().await, 2);
        let hits = index.search("buyback", 5).await.unwrap();
        assert_eq!(hits[0].page_number, Some(2));
    }
}
