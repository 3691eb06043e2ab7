//! Append-only audit log: one JSON object per line in `.kanuka/audit.jsonl`.
//!
//! Auditing never fails an operation; append errors are logged and dropped.

use std::fs::OpenOptions;
use std::io::Write;

use chrono::Utc;
use serde::Serialize;

use crate::layout::StoreLayout;

#[derive(Debug, Clone, Serialize, Default)]
pub struct AuditRecord {
    /// UTC with microseconds.
    pub ts: String,
    pub user: String,
    pub uuid: String,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl AuditRecord {
    pub fn new(op: &str, user: &str, uuid: &str) -> Self {
        AuditRecord {
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            user: user.to_string(),
            uuid: uuid.to_string(),
            op: op.to_string(),
            ..Default::default()
        }
    }
}

/// Best-effort append.
pub fn append(layout: &StoreLayout, record: &AuditRecord) {
    if let Err(err) = try_append(layout, record) {
        tracing::warn!(op = %record.op, %err, "failed to append audit record");
    }
}

fn try_append(layout: &StoreLayout, record: &AuditRecord) -> std::io::Result<()> {
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(layout.audit_path())?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_as_json_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::at(tmp.path());
        layout.create_skeleton().unwrap();

        let mut record = AuditRecord::new("encrypt", "alice@example.com", "aaa");
        record.files = Some(vec![".env".into()]);
        record.files_count = Some(1);
        append(&layout, &record);
        append(&layout, &AuditRecord::new("sync", "alice@example.com", "aaa"));

        let text = std::fs::read_to_string(layout.audit_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["op"], "encrypt");
        assert_eq!(first["files_count"], 1);
        // microsecond timestamps, trailing Z
        let ts = first["ts"].as_str().unwrap();
        assert!(ts.ends_with('Z') && ts.contains('.'));
        // absent optional fields are omitted entirely
        assert!(first.get("target_user").is_none());
    }

    #[test]
    fn append_failure_is_swallowed() {
        // store dir never created: the append has nowhere to write
        let layout = StoreLayout::at("/nonexistent/path");
        append(&layout, &AuditRecord::new("sync", "a@b.c", "aaa"));
    }
}
