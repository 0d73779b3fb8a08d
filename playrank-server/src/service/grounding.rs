//! Grounding Validator
//!
//! A citation is grounded when its chunk id belongs to the job's grounding set
//! and, when quote verification is on, its quote occurs in that chunk's text.
//! The lenient policy drops ungrounded citations and reports how many; the
//! strict policy rejects the whole output.

use std::collections::HashMap;

use playrank_core::domain::evidence::{Citation, EvidenceChunk};
use uuid::Uuid;

use crate::service::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitationPolicy {
    /// Drop ungrounded citations and keep going
    #[default]
    Lenient,
    /// Fail the job on the first ungrounded citation
    Strict,
}

impl CitationPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Some(CitationPolicy::Lenient),
            "strict" => Some(CitationPolicy::Strict),
            _ => None,
        }
    }
}

/// The evidence a job may cite, keyed by chunk id
#[derive(Debug, Clone, Default)]
pub struct GroundingSet {
    texts: HashMap<Uuid, String>,
}

impl GroundingSet {
    pub fn from_chunks(chunks: &[EvidenceChunk]) -> Self {
        Self {
            texts: chunks.iter().map(|c| (c.id, normalize(&c.text))).collect(),
        }
    }

    pub fn contains(&self, chunk_id: Uuid) -> bool {
        self.texts.contains_key(&chunk_id)
    }

    fn quote_occurs(&self, citation: &Citation) -> bool {
        let quote = normalize(&citation.quote);
        self.texts
            .get(&citation.chunk_id)
            .is_some_and(|text| !quote.is_empty() && text.contains(&quote))
    }
}

/// Case-folded text with runs of whitespace collapsed
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Citations that survived validation, plus how many were dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filtered {
    pub accepted: Vec<Citation>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroundingValidator {
    pub policy: CitationPolicy,
    pub verify_quotes: bool,
}

impl GroundingValidator {
    pub fn new(policy: CitationPolicy, verify_quotes: bool) -> Self {
        Self {
            policy,
            verify_quotes,
        }
    }

    fn is_grounded(&self, citation: &Citation, set: &GroundingSet) -> bool {
        if !set.contains(citation.chunk_id) {
            return false;
        }
        !self.verify_quotes || set.quote_occurs(citation)
    }

    /// Keep only grounded citations
    pub fn filter(&self, citations: Vec<Citation>, set: &GroundingSet) -> Filtered {
        let total = citations.len();
        let accepted: Vec<Citation> = citations
            .into_iter()
            .filter(|c| self.is_grounded(c, set))
            .collect();
        Filtered {
            dropped: total - accepted.len(),
            accepted,
        }
    }

    /// Fail if any citation is ungrounded
    pub fn assert_all_valid(&self, citations: &[Citation], set: &GroundingSet) -> Result<(), ServiceError> {
        let invalid = citations.iter().filter(|c| !self.is_grounded(c, set)).count();
        if invalid > 0 {
            return Err(ServiceError::InvalidCitation(invalid));
        }
        Ok(())
    }

    /// Validate according to the configured policy
    pub fn apply(&self, citations: Vec<Citation>, set: &GroundingSet) -> Result<Filtered, ServiceError> {
        match self.policy {
            CitationPolicy::Lenient => Ok(self.filter(citations, set)),
            CitationPolicy::Strict => {
                self.assert_all_valid(&citations, set)?;
                Ok(Filtered {
                    accepted: citations,
                    dropped: 0,
                })
            }
        }
    }
}
