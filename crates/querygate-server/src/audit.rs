use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{SecondsFormat, Utc};
use querygate_contracts::{AuditAction, AuditStatus, LogsResponse};
use querygate_kernel::jcs_sha256_hex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only, hash-chained JSONL audit trail. One file per process run,
/// created on the first append.
pub struct AuditJsonl {
    path: PathBuf,
    sink: Mutex<AuditSink>,
}

#[derive(Default)]
struct AuditSink {
    file: Option<tokio::fs::File>,
    last_hash: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditRecord {
    pub audit_id: String,
    pub action: AuditAction,
    pub tenant_id: i64,
    pub status: AuditStatus,
    pub details: Map<String, Value>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    pub record_hash: String,
}

impl AuditRecord {
    fn new(
        action: AuditAction,
        tenant_id: i64,
        details: Map<String, Value>,
        status: AuditStatus,
    ) -> Self {
        Self {
            audit_id: format!("audit_{}", uuid::Uuid::new_v4().as_simple()),
            action,
            tenant_id,
            status,
            details,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            prev_hash: None,
            record_hash: String::new(),
        }
    }
}

impl AuditJsonl {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let run_id = uuid::Uuid::new_v4().as_simple().to_string();
        let file_name = format!(
            "audit-{}-{}.jsonl",
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            &run_id[..8]
        );
        Self {
            path: log_dir.as_ref().join(file_name),
            sink: Mutex::new(AuditSink::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails the caller: a record that cannot be written is reported
    /// through tracing and dropped.
    pub async fn record(
        &self,
        action: AuditAction,
        tenant_id: i64,
        details: Map<String, Value>,
        status: AuditStatus,
    ) {
        let rec = AuditRecord::new(action, tenant_id, details, status);
        let audit_id = rec.audit_id.clone();
        if let Err(e) = self.append(rec).await {
            tracing::warn!(
                error = %e,
                audit_id = %audit_id,
                path = %self.path.display(),
                "audit record dropped"
            );
        }
    }

    async fn append(&self, mut rec: AuditRecord) -> Result<(), String> {
        let mut guard = self.sink.lock().await;
        let sink = &mut *guard;

        rec.prev_hash = sink.last_hash.clone();
        rec.record_hash = record_hash(&rec)?;
        let mut line = serde_json::to_string(&rec).map_err(|e| e.to_string())?;
        line.push('\n');

        if sink.file.is_none() {
            sink.file = Some(open_append(&self.path).await?);
        }
        if let Some(file) = sink.file.as_mut() {
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| e.to_string())?;
            file.flush().await.map_err(|e| e.to_string())?;
        }
        sink.last_hash = Some(rec.record_hash);
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<tokio::fs::File, String> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| e.to_string())?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| e.to_string())
}

fn record_hash(rec: &AuditRecord) -> Result<String, String> {
    let mut seeded = rec.clone();
    seeded.record_hash.clear();
    let value = serde_json::to_value(&seeded).map_err(|e| e.to_string())?;
    jcs_sha256_hex(&value)
}

pub fn verify_audit_chain(path: &str) -> Result<String, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut prev: Option<String> = None;
    let mut count = 0usize;

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let rec: AuditRecord = serde_json::from_str(line)
            .map_err(|e| format!("line {} parse failed: {e}", idx + 1))?;
        if rec.prev_hash != prev {
            return Err(format!(
                "line {} prev_hash mismatch: expected {:?}, got {:?}",
                idx + 1,
                prev,
                rec.prev_hash
            ));
        }
        let expected_hash = record_hash(&rec)
            .map_err(|e| format!("line {} hash seed failed: {e}", idx + 1))?;
        if rec.record_hash != expected_hash {
            return Err(format!(
                "line {} record_hash mismatch: expected {}, got {}",
                idx + 1,
                expected_hash,
                rec.record_hash
            ));
        }
        prev = Some(rec.record_hash);
        count += 1;
    }

    Ok(format!("audit chain verified: {count} records"))
}

/// Reads the most recently modified log file in `dir`, newest record first.
/// Lines that are not JSON are skipped; a missing directory is an empty result.
pub async fn read_latest_log(dir: &Path) -> std::io::Result<LogsResponse> {
    let empty = LogsResponse {
        logs: Vec::new(),
        filename: None,
    };
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(empty),
        Err(e) => return Err(e),
    };

    let mut latest: Option<(SystemTime, String, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !(name.ends_with(".jsonl") || name.ends_with(".json")) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        let newer = latest
            .as_ref()
            .map_or(true, |(t, n, _)| (modified, &name) > (*t, n));
        if newer {
            latest = Some((modified, name, entry.path()));
        }
    }

    let Some((_, filename, path)) = latest else {
        return Ok(empty);
    };
    let bytes = tokio::fs::read(&path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let mut logs: Vec<Value> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    logs.reverse();

    Ok(LogsResponse {
        logs,
        filename: Some(filename),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("querygate-{label}-{nanos}"))
    }

    fn details(query: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("query".to_string(), Value::String(query.to_string()));
        m
    }

    #[tokio::test]
    async fn file_is_created_lazily_and_chained() {
        let dir = temp_dir("audit-lazy");
        let audit = AuditJsonl::new(&dir);
        assert!(!dir.exists());

        audit
            .record(AuditAction::ChatQuery, 3, details("a"), AuditStatus::Success)
            .await;
        audit
            .record(AuditAction::ChartGeneration, 3, details("b"), AuditStatus::Failure)
            .await;

        let path = audit.path().to_string_lossy().to_string();
        assert_eq!(
            verify_audit_chain(&path).unwrap(),
            "audit chain verified: 2 records"
        );
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(lines[0].get("prev_hash").is_none());
        assert_eq!(lines[1]["prev_hash"], lines[0]["record_hash"]);
        assert_eq!(lines[1]["status"], "FAILURE");
        assert_eq!(lines[1]["action"], "CHART_GENERATION");
        assert!(lines[0]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn unwritable_destination_is_swallowed() {
        let blocker = temp_dir("audit-blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let audit = AuditJsonl::new(blocker.join("nested"));
        audit
            .record(AuditAction::ChatQuery, 1, Map::new(), AuditStatus::Success)
            .await;
        assert!(!audit.path().exists());
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let logs = read_latest_log(&temp_dir("audit-missing")).await.unwrap();
        assert!(logs.logs.is_empty());
        assert!(logs.filename.is_none());
    }

    #[tokio::test]
    async fn reads_newest_file_newest_first_skipping_corrupt_lines() {
        let dir = temp_dir("audit-read");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("old.jsonl"), "{\"n\":0}\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(
            dir.join("new.jsonl"),
            "{\"n\":1}\nnot json\n\n{\"n\":2}\n",
        )
        .unwrap();

        let logs = read_latest_log(&dir).await.unwrap();
        assert_eq!(logs.filename.as_deref(), Some("new.jsonl"));
        assert_eq!(
            logs.logs,
            vec![serde_json::json!({"n": 2}), serde_json::json!({"n": 1})]
        );
    }
}
