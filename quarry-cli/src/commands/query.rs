//! Query command handler

use anyhow::{Context, Result};
use colored::*;
use quarry_client::{ClientError, Options, RowSequence};
use quarry_core::domain::rows::{FieldSchema, Row};

use crate::config::Config;

/// Submit a query, wait for it and print its rows
///
/// Ctrl-C cancels the wait; the job itself keeps running on the service.
pub async fn run_query(config: &Config, sql: &str, max_rows: Option<usize>) -> Result<()> {
    let client = config.client()?;
    // Validate early for a friendlier message than the client's Invalid error
    config.project()?;

    let future = client.submit_query_and_poll(sql, Options::new());

    let result = tokio::select! {
        result = future.get() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Cancelling...".yellow());
            future.cancel();
            future.get().await
        }
    };

    let response = match result {
        Ok(response) => response,
        Err(ClientError::JobFailed { job_id, detail }) => {
            println!("{} {}", "✗ Job failed:".red().bold(), job_id);
            println!("  {}", detail.to_string().red());
            return Ok(());
        }
        Err(ClientError::Cancelled) => {
            println!("{}", "Query cancelled.".yellow());
            return Ok(());
        }
        Err(e) => return Err(e).context("Query failed"),
    };

    println!(
        "{} {}",
        "✓ Job finished:".green().bold(),
        response.job.reference.to_string().cyan()
    );

    let mut rows = response.rows;
    let mut header_printed = false;
    let printed = drain_rows(&mut rows, max_rows, |schema, row| {
        if !header_printed {
            print_header(schema);
            header_printed = true;
        }
        print_row(row);
    })
    .await
    .context("Failed to fetch result rows")?;

    let truncated = rows.total_rows().is_some_and(|total| total > printed as u64);
    if max_rows == Some(printed) && truncated {
        println!("{}", "...".dimmed());
    }

    match rows.total_rows() {
        Some(total) => println!("{}", format!("{} of {} row(s)", printed, total).dimmed()),
        None => println!("{}", format!("{} row(s)", printed).dimmed()),
    }

    Ok(())
}

/// Hand rows to `emit` until `max_rows` have been seen or the results run out
///
/// The limit is checked before each read, so no page past it is fetched.
async fn drain_rows<F>(
    rows: &mut RowSequence,
    max_rows: Option<usize>,
    mut emit: F,
) -> Result<usize, ClientError>
where
    F: FnMut(&[FieldSchema], &Row),
{
    let mut seen = 0usize;
    while max_rows.is_none_or(|max| seen < max) {
        let Some(row) = rows.next().await else {
            break;
        };
        let row = row?;
        emit(rows.schema(), &row);
        seen += 1;
    }
    Ok(seen)
}

fn print_header(schema: &[FieldSchema]) {
    if schema.is_empty() {
        return;
    }
    let names: Vec<String> = schema.iter().map(|f| f.name.clone()).collect();
    println!("{}", names.join("\t").bold());
    println!("{}", "─".repeat(80).dimmed());
}

fn print_row(row: &Row) {
    let cells: Vec<String> = row.values.iter().map(format_cell).collect();
    println!("{}", cells.join("\t"));
}

fn format_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_client::mock::ScriptedConnection;
    use quarry_core::domain::job::JobReference;
    use quarry_core::dto::job::QueryResultsPage;
    use serde_json::json;
    use std::sync::Arc;

    fn page(values: &[i64], token: Option<&str>) -> QueryResultsPage {
        QueryResultsPage {
            schema: vec![FieldSchema {
                name: "n".to_string(),
                field_type: "INTEGER".to_string(),
            }],
            rows: values.iter().map(|v| Row::new(vec![json!(v)])).collect(),
            total_rows: Some(4),
            page_token: token.map(str::to_string),
            job_complete: true,
        }
    }

    fn two_pages() -> Arc<ScriptedConnection> {
        let mock = Arc::new(ScriptedConnection::new());
        mock.push_query_results(Ok(page(&[1, 2], Some("t1"))));
        mock.push_query_results(Ok(page(&[3, 4], None)));
        mock
    }

    fn sequence(mock: &Arc<ScriptedConnection>) -> RowSequence {
        RowSequence::new(mock.clone(), JobReference::new("p", "j"), Options::new())
    }

    #[tokio::test]
    async fn test_row_limit_does_not_fetch_next_page() {
        let mock = two_pages();
        let mut rows = sequence(&mock);
        let mut emitted = Vec::new();

        let seen = drain_rows(&mut rows, Some(2), |schema, row| {
            assert_eq!(schema[0].name, "n");
            emitted.push(row.values[0].as_i64().unwrap());
        })
        .await
        .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(emitted, vec![1, 2]);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_row_limit_fetches_nothing() {
        let mock = two_pages();
        let mut rows = sequence(&mock);

        let seen = drain_rows(&mut rows, Some(0), |_, _| panic!("no rows expected"))
            .await
            .unwrap();

        assert_eq!(seen, 0);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_row_limit_reads_every_page() {
        let mock = two_pages();
        let mut rows = sequence(&mock);

        let seen = drain_rows(&mut rows, None, |_, _| {}).await.unwrap();

        assert_eq!(seen, 4);
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_format_cell() {
        assert_eq!(format_cell(&json!(null)), "NULL");
        assert_eq!(format_cell(&json!("abc")), "abc");
        assert_eq!(format_cell(&json!(42)), "42");
        assert_eq!(format_cell(&json!({"a": 1})), "{\"a\":1}");
    }
}
