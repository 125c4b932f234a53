//! Lazily paginated query results

use std::collections::VecDeque;
use std::sync::Arc;

use quarry_core::domain::job::JobReference;
use quarry_core::domain::rows::{FieldSchema, Row};
use quarry_core::dto::job::QueryResultsRequest;
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;
use crate::options::Options;

/// Rows of a finished query, fetched one page at a time
///
/// Cloning a sequence copies its position; each clone fetches independently.
#[derive(Debug, Clone)]
pub struct RowSequence {
    connection: Arc<dyn Connection>,
    options: Options,
    job: JobReference,
    page_size: Option<u32>,
    buffer: VecDeque<Row>,
    schema: Vec<FieldSchema>,
    total_rows: Option<u64>,
    page_token: Option<String>,
    done: bool,
}

impl RowSequence {
    pub fn new(connection: Arc<dyn Connection>, job: JobReference, options: Options) -> Self {
        Self {
            connection,
            options,
            job,
            page_size: None,
            buffer: VecDeque::new(),
            schema: Vec::new(),
            total_rows: None,
            page_token: None,
            done: false,
        }
    }

    /// Limits the number of rows requested per page
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn job(&self) -> &JobReference {
        &self.job
    }

    /// Schema of the result, empty until the first page is fetched
    pub fn schema(&self) -> &[FieldSchema] {
        &self.schema
    }

    /// Total row count reported by the service, if known yet
    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    /// Returns the next row, fetching a page when the buffer is empty.
    ///
    /// A failed fetch is returned once and ends the sequence.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page().await {
                self.done = true;
                return Some(Err(e));
            }
        }
    }

    /// Drains the remaining rows
    pub async fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let request = QueryResultsRequest {
            job: self.job.clone(),
            page_token: self.page_token.clone(),
            max_results: self.page_size,
        };
        let page = self
            .connection
            .get_query_results(&request, self.options.clone())
            .await?;

        debug!("Fetched {} row(s) for job {}", page.rows.len(), self.job);

        if !page.schema.is_empty() {
            self.schema = page.schema;
        }
        if page.total_rows.is_some() {
            self.total_rows = page.total_rows;
        }
        self.buffer.extend(page.rows);
        self.done = page.page_token.is_none();
        self.page_token = page.page_token;
        Ok(())
    }
}
