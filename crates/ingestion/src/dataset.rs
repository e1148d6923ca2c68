//! Dataset download, loading and analysis
//!
//! The corpus is a JSON array of paragraph objects:
//! `{"uid": 0, "ru_wiki_pageid": 3021, "text": "..."}`.

use crate::errors::{IngestionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument};

/// A validated corpus entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub uid: String,
    pub ru_wiki_pageid: String,
    pub text: String,
}

/// Download the dataset and store it as pretty-printed JSON.
///
/// Returns the number of records.
#[instrument(skip(output), fields(output = %output.display()))]
pub async fn fetch_dataset(url: &str, output: &Path) -> Result<usize> {
    let download_error = |message: String| IngestionError::Download {
        url: url.to_string(),
        message,
    };

    let response = reqwest::get(url)
        .await
        .map_err(|e| download_error(e.to_string()))?
        .error_for_status()
        .map_err(|e| download_error(e.to_string()))?;

    let data: Value = response
        .json()
        .await
        .map_err(|e| download_error(format!("response is not JSON: {}", e)))?;

    let records = as_record_array(&data)?;
    info!(records = records.len(), "Dataset downloaded");
    if let Some(first) = records.first() {
        debug!(first = %first, "First record");
    }

    write_json(output, &data).await?;
    info!("Dataset saved");
    Ok(records.len())
}

/// Read a dataset file without validating individual records
pub async fn load_raw(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Err(IngestionError::FileNotFound(path.display().to_string()));
    }
    let content = tokio::fs::read_to_string(path).await?;
    let data: Value = serde_json::from_str(&content)?;
    Ok(as_record_array(&data)?.to_vec())
}

/// Read a dataset file and validate every record
pub async fn load_records(path: &Path) -> Result<Vec<DatasetRecord>> {
    let raw = load_raw(path).await?;
    parse_records(&raw)
}

/// Write records (or any serializable value) as pretty JSON, creating parent
/// directories. Non-ASCII text is kept as is.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

fn as_record_array(data: &Value) -> Result<&[Value]> {
    data.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| IngestionError::InvalidDataset("expected a top-level JSON array".to_string()))
}

/// Numbers and strings are both accepted for identifiers
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate raw records: `uid` and `text` are required, `ru_wiki_pageid` is
/// optional. A null text is kept as empty and dropped later by cleaning.
pub fn parse_records(raw: &[Value]) -> Result<Vec<DatasetRecord>> {
    raw.iter()
        .enumerate()
        .map(|(position, value)| {
            let invalid = |message: &str| IngestionError::InvalidRecord {
                position,
                message: message.to_string(),
            };

            let object = value.as_object().ok_or_else(|| invalid("not an object"))?;

            let uid = object
                .get("uid")
                .and_then(id_string)
                .ok_or_else(|| invalid("missing or invalid uid"))?;

            let text = match object.get("text") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) => String::new(),
                Some(_) => return Err(invalid("text is not a string")),
                None => return Err(invalid("missing text")),
            };

            let ru_wiki_pageid = object
                .get("ru_wiki_pageid")
                .and_then(id_string)
                .unwrap_or_default();

            Ok(DatasetRecord {
                uid,
                ru_wiki_pageid,
                text,
            })
        })
        .collect()
}

/// Summary statistics of a raw dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_documents: usize,
    /// Mean text length in characters over records with a text
    pub average_text_length: f64,
    /// Records whose text is missing or blank
    pub empty_documents: usize,
    /// Records repeating an earlier uid
    pub duplicate_uids: usize,
    /// Records repeating an earlier text
    pub duplicate_texts: usize,
}

impl DatasetStats {
    /// Compute statistics; tolerant of malformed records
    pub fn analyze(raw: &[Value]) -> Self {
        let mut text_chars = 0usize;
        let mut texts_seen = 0usize;
        let mut empty_documents = 0;
        let mut uids = HashSet::new();
        let mut texts = HashSet::new();
        let mut duplicate_uids = 0;
        let mut duplicate_texts = 0;

        for record in raw {
            let text = record.get("text").unwrap_or(&Value::Null);
            match text.as_str() {
                Some(s) => {
                    text_chars += s.chars().count();
                    texts_seen += 1;
                    if s.trim().is_empty() {
                        empty_documents += 1;
                    }
                }
                None => empty_documents += 1,
            }

            if !texts.insert(text.to_string()) {
                duplicate_texts += 1;
            }
            if let Some(uid) = record.get("uid") {
                if !uids.insert(uid.to_string()) {
                    duplicate_uids += 1;
                }
            }
        }

        let average_text_length = if texts_seen == 0 {
            0.0
        } else {
            text_chars as f64 / texts_seen as f64
        };

        Self {
            total_documents: raw.len(),
            average_text_length,
            empty_documents,
            duplicate_uids,
            duplicate_texts,
        }
    }

    /// Log every statistic
    pub fn log(&self) {
        info!(
            total_documents = self.total_documents,
            average_text_length = self.average_text_length,
            empty_documents = self.empty_documents,
            duplicate_uids = self.duplicate_uids,
            duplicate_texts = self.duplicate_texts,
            "Dataset analysis"
        );
    }

    /// Markdown report
    pub fn to_markdown(&self, generated_at: DateTime<Utc>) -> String {
        format!(
            "# Анализ данных RuBQ 2.0\n\n\
             Generated: {}\n\n\
             ## Результаты анализа\n\
             - total_documents: {}\n\
             - average_text_length: {:.2}\n\
             - empty_documents: {}\n\
             - duplicate_uids: {}\n\
             - duplicate_texts: {}\n",
            generated_at.to_rfc3339(),
            self.total_documents,
            self.average_text_length,
            self.empty_documents,
            self.duplicate_uids,
            self.duplicate_texts,
        )
    }
}
