//! File parser over rows the caller already decoded

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use super::capabilities::{FileParser, ParseOptions};
use super::types::RawRow;
use crate::utils::error::Result;

/// Serves rows that were decoded upstream (CSV, spreadsheet, JSON upload)
#[derive(Debug, Clone, Default)]
pub struct PreparsedRows {
    headers: Vec<String>,
    rows: Vec<RawRow>,
}

impl PreparsedRows {
    /// Headers are collected from the rows in first-seen order
    pub fn new(rows: Vec<RawRow>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            for column in row.keys() {
                if !headers.contains(column) {
                    headers.push(column.clone());
                }
            }
        }
        Self { headers, rows }
    }

    pub fn with_headers(headers: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { headers, rows }
    }
}

fn is_empty_row(row: &RawRow) -> bool {
    row.values().all(|value| match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    })
}

#[async_trait]
impl FileParser for PreparsedRows {
    async fn parse(&self, options: &ParseOptions) -> Result<Vec<RawRow>> {
        let rows = self
            .rows
            .iter()
            .filter(|row| !(options.skip_empty_rows && is_empty_row(row)))
            .take(options.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn sample_rows(&self, limit: usize, offset: usize) -> Result<Vec<RawRow>> {
        Ok(self.rows.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn headers(&self) -> Result<Vec<String>> {
        Ok(self.headers.clone())
    }

    async fn row_count(&self) -> Result<usize> {
        Ok(self.rows.len())
    }

    fn stream_chunks(&self, chunk_size: usize) -> BoxStream<'_, Result<Vec<RawRow>>> {
        stream::iter(self.rows.chunks(chunk_size.max(1)).map(|chunk| Ok(chunk.to_vec()))).boxed()
    }
}
