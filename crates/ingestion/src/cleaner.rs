//! Text normalisation and deduplication

use crate::dataset::DatasetRecord;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, warn};

/// Punctuation kept by normalisation
const KEPT_PUNCTUATION: [char; 4] = ['.', ',', '!', '?'];

/// Normalise a paragraph for indexing.
///
/// Collapses whitespace runs to one space, drops every character that is not
/// a letter, digit, underscore, whitespace or `.,!?`, and lowercases. Returns
/// `None` for blank input or when fewer than `min_length` characters remain.
pub fn normalize_text(text: &str, min_length: usize) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let filtered: String = collapsed
        .chars()
        .filter(|c| {
            c.is_alphanumeric() || *c == '_' || c.is_whitespace() || KEPT_PUNCTUATION.contains(c)
        })
        .collect();
    let normalized = filtered.to_lowercase();

    if normalized.chars().count() < min_length {
        return None;
    }
    Some(normalized)
}

/// Stable key for deduplicating normalised text
pub fn text_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// What cleaning removed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub initial_count: usize,
    pub duplicate_uids: usize,
    pub duplicate_texts: usize,
    /// Blank or shorter than the minimum after normalisation
    pub too_short: usize,
    /// Distinct texts that normalised to the same string
    pub normalized_duplicates: usize,
    pub final_count: usize,
}

impl CleaningReport {
    pub fn removed(&self) -> usize {
        self.initial_count - self.final_count
    }
}

/// Deduplicate and normalise records. The first occurrence always wins.
pub fn clean_records(
    records: Vec<DatasetRecord>,
    min_length: usize,
) -> (Vec<DatasetRecord>, CleaningReport) {
    let mut report = CleaningReport {
        initial_count: records.len(),
        ..CleaningReport::default()
    };

    let mut uids = HashSet::new();
    let mut by_uid = Vec::with_capacity(records.len());
    for record in records {
        if uids.insert(record.uid.clone()) {
            by_uid.push(record);
        } else {
            report.duplicate_uids += 1;
        }
    }
    if report.duplicate_uids > 0 {
        warn!(count = report.duplicate_uids, "Dropped records with duplicate uids");
    }

    let mut texts = HashSet::new();
    let mut by_text = Vec::with_capacity(by_uid.len());
    for record in by_uid {
        if texts.insert(record.text.clone()) {
            by_text.push(record);
        } else {
            report.duplicate_texts += 1;
        }
    }
    if report.duplicate_texts > 0 {
        warn!(count = report.duplicate_texts, "Dropped records with duplicate texts");
    }

    let mut keys = HashSet::new();
    let mut cleaned = Vec::with_capacity(by_text.len());
    for record in by_text {
        let Some(text) = normalize_text(&record.text, min_length) else {
            report.too_short += 1;
            continue;
        };
        if !keys.insert(text_key(&text)) {
            report.normalized_duplicates += 1;
            continue;
        }
        cleaned.push(DatasetRecord { text, ..record });
    }

    report.final_count = cleaned.len();
    info!(
        initial = report.initial_count,
        remaining = report.final_count,
        removed = report.removed(),
        too_short = report.too_short,
        "Cleaning finished"
    );

    (cleaned, report)
}
