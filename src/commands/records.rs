//! `retrace records` command.

use crate::cli::RecordsArgs;
use crate::traffic::TrafficStore;
use crate::RetraceResult;

/// Execute the `records` command.
///
/// Displays a table of the capture's records: id, method, status, capture
/// time, and URL. Useful for finding a `--target` substring.
///
/// # Errors
///
/// Returns an error string if the capture cannot be loaded.
pub fn run(args: &RecordsArgs) -> Result<(), String> {
    run_inner(args).map_err(|err| err.to_string())
}

fn run_inner(args: &RecordsArgs) -> RetraceResult<()> {
    let store = TrafficStore::from_har_file(&args.har)?;
    let needle = args.filter.as_ref().map(|f| f.to_ascii_lowercase());

    let mut rows: Vec<(String, String, String, String, String)> = Vec::new();
    for record in store.records() {
        if let Some(needle) = &needle {
            if !record.url.to_ascii_lowercase().contains(needle) {
                continue;
            }
        }
        rows.push((
            record.id.to_string(),
            record.method.clone(),
            record.status.to_string(),
            record.started_at.format("%H:%M:%S%.3f").to_string(),
            record.url.clone(),
        ));
    }

    if rows.is_empty() {
        println!("No matching records.");
        return Ok(());
    }

    let id_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(2).max(2);
    let method_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(6).max(6);
    let status_width = rows.iter().map(|r| r.2.len()).max().unwrap_or(6).max(6);
    let time_width = rows.iter().map(|r| r.3.len()).max().unwrap_or(4).max(4);

    println!(
        "{:<id_width$}  {:<method_width$}  {:<status_width$}  {:<time_width$}  URL",
        "ID", "METHOD", "STATUS", "TIME",
    );
    println!(
        "{:-<id_width$}  {:-<method_width$}  {:-<status_width$}  {:-<time_width$}  ---",
        "", "", "", "",
    );
    for (id, method, status, time, url) in &rows {
        println!(
            "{id:<id_width$}  {method:<method_width$}  {status:<status_width$}  {time:<time_width$}  {url}",
        );
    }

    if store.skipped() > 0 {
        println!("\n{} record(s), {} skipped during load.", rows.len(), store.skipped());
    } else {
        println!("\n{} record(s).", rows.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("retrace-records-{name}-{}", uuid::Uuid::new_v4()))
    }

    fn write_sample_har(path: &std::path::Path) {
        let text = r#"{
          "log": {
            "entries": [
              {
                "startedDateTime": "2024-03-01T10:00:00.000Z",
                "request": {"method": "GET", "url": "https://api.example.com/account"},
                "response": {"status": 200}
              },
              {
                "startedDateTime": "2024-03-01T10:00:05.000Z",
                "request": {"method": "GET", "url": "https://api.example.com/bill"},
                "response": {"status": 404}
              }
            ]
          }
        }"#;
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn lists_records_from_a_capture() {
        let har = scratch("list.har");
        write_sample_har(&har);
        let result = run(&RecordsArgs {
            har: har.clone(),
            filter: None,
        });
        std::fs::remove_file(&har).ok();
        assert!(result.is_ok());
    }

    #[test]
    fn filter_narrows_the_listing() {
        let har = scratch("filter.har");
        write_sample_har(&har);
        let result = run(&RecordsArgs {
            har: har.clone(),
            filter: Some("BILL".into()),
        });
        std::fs::remove_file(&har).ok();
        assert!(result.is_ok());
    }

    #[test]
    fn missing_capture_is_an_error() {
        let result = run(&RecordsArgs {
            har: PathBuf::from("/nonexistent/capture.har"),
            filter: None,
        });
        assert!(result.is_err());
    }
}
