//! Trims a HAR capture down to the entries whose URL matches a substring.
//!
//! Large captures slow down target selection and resolution; cutting the
//! capture to the host or path family under investigation first makes the
//! main tool much cheaper to run.
//!
//! Usage: `har_slim <input.har> <output.har> <url-substring>`

use std::path::PathBuf;
use std::{env, fs, process};

fn slim_har(input: &str, output: &str, needle: &str) -> Result<(), String> {
    let input_path = PathBuf::from(input);
    let output_path = PathBuf::from(output);

    let content = fs::read_to_string(&input_path)
        .map_err(|e| format!("Failed to read {}: {e}", input_path.display()))?;
    let mut har: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {e}", input_path.display()))?;

    let entries = har
        .pointer_mut("/log/entries")
        .and_then(serde_json::Value::as_array_mut)
        .ok_or_else(|| format!("{} has no log.entries array", input_path.display()))?;

    let total = entries.len();
    let needle_lower = needle.to_lowercase();
    entries.retain(|entry| {
        entry
            .pointer("/request/url")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|url| url.to_lowercase().contains(&needle_lower))
    });
    let kept = entries.len();

    let json = serde_json::to_string_pretty(&har)
        .map_err(|e| format!("Failed to serialize trimmed capture: {e}"))?;
    fs::write(&output_path, json)
        .map_err(|e| format!("Failed to write {}: {e}", output_path.display()))?;

    println!("Wrote {} ({kept} of {total} entries kept)", output_path.display());
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: har_slim <input.har> <output.har> <url-substring>");
        process::exit(1);
    }

    if let Err(e) = slim_har(&args[1], &args[2], &args[3]) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_capture_fixture(path: &std::path::Path) {
        let har = json!({
            "log": {
                "version": "1.2",
                "creator": {"name": "browser", "version": "1.0"},
                "entries": [
                    {
                        "startedDateTime": "2024-05-01T10:00:00.000Z",
                        "request": {"method": "GET", "url": "https://api.example.com/v1/account", "headers": []},
                        "response": {"status": 200, "headers": [], "content": {"text": "{}"}}
                    },
                    {
                        "startedDateTime": "2024-05-01T10:00:01.000Z",
                        "request": {"method": "GET", "url": "https://cdn.example.com/app.js", "headers": []},
                        "response": {"status": 200, "headers": [], "content": {"text": ""}}
                    },
                    {
                        "startedDateTime": "2024-05-01T10:00:02.000Z",
                        "request": {"method": "POST", "url": "https://API.example.com/v1/bill", "headers": []},
                        "response": {"status": 200, "headers": [], "content": {"text": "{}"}}
                    }
                ]
            }
        });
        std::fs::write(path, serde_json::to_string_pretty(&har).unwrap()).unwrap();
    }

    #[test]
    fn slim_keeps_only_matching_entries_and_the_log_envelope() {
        let dir = std::env::temp_dir().join("retrace_har_slim_test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let input = dir.join("full.har");
        let output = dir.join("slim.har");
        write_capture_fixture(&input);

        slim_har(input.to_str().unwrap(), output.to_str().unwrap(), "api.example.com").unwrap();

        let slim: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let entries = slim["log"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2, "cdn entry should be dropped");
        // Matching is case-insensitive, so the API.example.com entry survives.
        assert_eq!(entries[0]["request"]["url"].as_str().unwrap(), "https://api.example.com/v1/account");
        assert_eq!(entries[1]["request"]["url"].as_str().unwrap(), "https://API.example.com/v1/bill");
        // Everything outside entries is preserved untouched.
        assert_eq!(slim["log"]["version"].as_str().unwrap(), "1.2");
        assert_eq!(slim["log"]["creator"]["name"].as_str().unwrap(), "browser");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn slim_rejects_a_file_without_entries() {
        let dir = std::env::temp_dir().join("retrace_har_slim_bad_test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let input = dir.join("bad.har");
        let output = dir.join("out.har");
        std::fs::write(&input, r#"{"log": {}}"#).unwrap();

        let err = slim_har(input.to_str().unwrap(), output.to_str().unwrap(), "api").unwrap_err();
        assert!(err.contains("no log.entries"), "got: {err}");

        let _ = fs::remove_dir_all(&dir);
    }
}
