//! Reference JSONL backend.
//!
//! Records are stored one JSON object per line in `records.jsonl`; schemas
//! live in a sibling `schemas.jsonl`. Both files are append-only: schema
//! deactivation appends a new line for the same `schema_id` and the loader
//! keeps the last line per id. The only rewrite ever performed is the
//! retention sweep, which goes through a temp file and an atomic rename.
//!
//! Concurrency contract: single writer per path. Appends and sweeps
//! serialize on one write lock; queries open independent read handles and
//! may run concurrently with the writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::StreamExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::backend::{AuditBackend, RecordStream};
use crate::error::AuditError;
use crate::integrity::{
    compute_record_hash, ChainVerifier, IntegrityResult, SignatureProvider, GENESIS_HASH,
};
use crate::query::RecordFilter;
use crate::record::AuditRecord;
use crate::retention::{retention_cutoff, RetentionReport};
use crate::schema::{AuditSchema, EvidenceLevel};

const RECORDS_FILE: &str = "records.jsonl";
const SCHEMAS_FILE: &str = "schemas.jsonl";

/// How many records a query stream buffers ahead of the consumer.
const QUERY_CHANNEL_CAPACITY: usize = 64;

struct WriteState {
    /// `record_hash` of the last record in the file; [`GENESIS_HASH`] for an
    /// empty log.
    last_hash: String,
}

/// Append-only JSONL storage for schemas and records.
pub struct JsonlBackend {
    records_path: PathBuf,
    schemas_path: PathBuf,

    /// Serializes appends, schema writes, and retention sweeps.
    write: Mutex<WriteState>,

    /// Schema index, last persisted line per `schema_id`.
    schemas: RwLock<HashMap<String, AuditSchema>>,

    signer: Option<Arc<dyn SignatureProvider>>,

    closed: AtomicBool,
}

impl JsonlBackend {
    /// Open (or create) a backend rooted at `dir`.
    ///
    /// Re-reads the schema index and the chain tail so the hash chain
    /// continues across restarts.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let records_path = dir.join(RECORDS_FILE);
        let schemas_path = dir.join(SCHEMAS_FILE);

        let schemas = load_schema_index(&schemas_path).await?;
        let last_hash = load_chain_tail(&records_path).await?;

        Ok(Self {
            records_path,
            schemas_path,
            write: Mutex::new(WriteState { last_hash }),
            schemas: RwLock::new(schemas),
            signer: None,
            closed: AtomicBool::new(false),
        })
    }

    /// Attach a signing capability for forensic-level schemas.
    pub fn with_signer(mut self, signer: Arc<dyn SignatureProvider>) -> Self {
        self.signer = Some(signer);
        self
    }

    fn ensure_open(&self) -> Result<(), AuditError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AuditError::Storage("backend is closed".to_string()));
        }
        Ok(())
    }

    fn evidence_level(&self, name: &str, version: u32) -> Option<EvidenceLevel> {
        let schemas = self.schemas.read().expect("schema index poisoned");
        schemas
            .get(&format!("{name}:v{version}"))
            .map(|s| s.evidence_level)
    }

    async fn append_schema_line(&self, schema: &AuditSchema) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(schema)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.schemas_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

async fn load_schema_index(path: &Path) -> Result<HashMap<String, AuditSchema>, AuditError> {
    let mut index = HashMap::new();
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let schema: AuditSchema = serde_json::from_str(&line).map_err(|e| {
            AuditError::Storage(format!("unreadable schema line in {}: {e}", path.display()))
        })?;
        index.insert(schema.schema_id(), schema);
    }
    Ok(index)
}

/// Find the stored hash of the last intact record, or [`GENESIS_HASH`].
///
/// A torn trailing line (crash mid-append) is ignored here; it surfaces as an
/// unreadable line during queries and verification instead.
async fn load_chain_tail(path: &Path) -> Result<String, AuditError> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(GENESIS_HASH.to_string())
        }
        Err(e) => return Err(e.into()),
    };

    let mut tail = GENESIS_HASH.to_string();
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
            tail = record.record_hash;
        }
    }
    Ok(tail)
}

#[async_trait]
impl AuditBackend for JsonlBackend {
    async fn create_schema(&self, schema: AuditSchema) -> Result<(), AuditError> {
        self.ensure_open()?;
        schema.validate()?;

        let schema_id = schema.schema_id();
        {
            let schemas = self.schemas.read().expect("schema index poisoned");
            if schemas.contains_key(&schema_id) {
                return Err(AuditError::SchemaExists(schema_id));
            }
            if let Some(max) = schemas
                .values()
                .filter(|s| s.schema_name == schema.schema_name)
                .map(|s| s.version)
                .max()
            {
                if schema.version <= max {
                    return Err(AuditError::InvalidSchema(format!(
                        "version {} for {} must exceed existing version {}",
                        schema.version, schema.schema_name, max
                    )));
                }
            }
        }

        let _write = self.write.lock().await;
        self.append_schema_line(&schema).await?;

        let mut schemas = self.schemas.write().expect("schema index poisoned");
        schemas.insert(schema_id, schema);
        Ok(())
    }

    async fn get_schema(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<AuditSchema>, AuditError> {
        let schemas = self.schemas.read().expect("schema index poisoned");
        Ok(match version {
            Some(v) => schemas.get(&format!("{name}:v{v}")).cloned(),
            None => schemas
                .values()
                .filter(|s| s.schema_name == name)
                .max_by_key(|s| s.version)
                .cloned(),
        })
    }

    async fn list_schemas(&self, active_only: bool) -> Result<Vec<AuditSchema>, AuditError> {
        let schemas = self.schemas.read().expect("schema index poisoned");
        let mut out: Vec<_> = schemas
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.schema_name
                .cmp(&b.schema_name)
                .then(a.version.cmp(&b.version))
        });
        Ok(out)
    }

    async fn deactivate_schema(&self, name: &str, version: u32) -> Result<(), AuditError> {
        self.ensure_open()?;
        let schema_id = format!("{name}:v{version}");

        let mut updated = {
            let schemas = self.schemas.read().expect("schema index poisoned");
            match schemas.get(&schema_id) {
                None => return Err(AuditError::SchemaNotFound(schema_id)),
                Some(s) if !s.active => return Ok(()),
                Some(s) => s.clone(),
            }
        };
        updated.active = false;

        let _write = self.write.lock().await;
        self.append_schema_line(&updated).await?;

        let mut schemas = self.schemas.write().expect("schema index poisoned");
        schemas.insert(schema_id, updated);
        Ok(())
    }

    async fn write_batch(&self, mut records: Vec<AuditRecord>) -> Result<Vec<String>, AuditError> {
        self.ensure_open()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.write.lock().await;

        let mut buf = String::new();
        let mut ids = Vec::with_capacity(records.len());
        let mut tail = state.last_hash.clone();

        for record in &mut records {
            let level = self
                .evidence_level(&record.schema_name, record.schema_version)
                .ok_or_else(|| {
                    AuditError::SchemaNotFound(format!(
                        "{}:v{}",
                        record.schema_name, record.schema_version
                    ))
                })?;

            if record.record_id.is_empty() {
                record.record_id = Uuid::new_v4().to_string();
            }
            record.prev_hash = tail.clone();
            record.record_hash = compute_record_hash(record)?;

            if level == EvidenceLevel::Forensic {
                if let Some(ref signer) = self.signer {
                    record.signature = Some(signer.sign(&record.record_hash)?);
                }
            }

            tail = record.record_hash.clone();
            ids.push(record.record_id.clone());
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        // One write for the whole batch; the chain tail only advances once
        // the bytes are down.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.records_path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        state.last_hash = tail;
        Ok(ids)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<AuditRecord>, AuditError> {
        let file = match File::open(&self.records_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
                if record.record_id == record_id {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    async fn query_records(&self, filter: RecordFilter) -> Result<RecordStream, AuditError> {
        let path = self.records_path.clone();
        let (tx, rx) = mpsc::channel::<Result<AuditRecord, AuditError>>(QUERY_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let file = match File::open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };

            let mut lines = BufReader::new(file).lines();
            let mut to_skip = filter.offset.unwrap_or(0);
            let mut remaining = filter.limit;

            loop {
                if remaining == Some(0) {
                    break;
                }
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let record = match serde_json::from_str::<AuditRecord>(&line) {
                    Ok(record) => record,
                    Err(e) => {
                        // Surface the corrupt line and keep going; the
                        // consumer decides whether to skip or abort.
                        if tx
                            .send(Err(AuditError::Storage(format!(
                                "unreadable record line: {e}"
                            ))))
                            .await
                            .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                };

                if !filter.matches(&record) {
                    continue;
                }
                if to_skip > 0 {
                    to_skip -= 1;
                    continue;
                }

                // A dropped receiver cancels the scan.
                if tx.send(Ok(record)).await.is_err() {
                    break;
                }
                if let Some(ref mut n) = remaining {
                    *n -= 1;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn verify_integrity(
        &self,
        start_id: &str,
        end_id: &str,
    ) -> Result<IntegrityResult, AuditError> {
        let file = match File::open(&self.records_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuditError::RecordNotFound(start_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();

        // Hash of the record on the line immediately before the range, when
        // that line exists and is intact. A range starting at the first line
        // trusts the stored seed: a retention sweep may have removed the
        // genesis-anchored head.
        let mut preceding_hash: Option<String> = None;
        let mut found_end = false;
        let mut verifier: Option<ChainVerifier<'_>> = None;
        let signer = self.signer.as_deref();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<AuditRecord>(&line);

            match verifier.as_mut() {
                None => match parsed {
                    Ok(record) if record.record_id == start_id => {
                        let mut v = ChainVerifier::new(preceding_hash.take(), signer);
                        v.push(&record)?;
                        if record.record_id == end_id {
                            found_end = true;
                            verifier = Some(v);
                            break;
                        }
                        verifier = Some(v);
                    }
                    Ok(record) => {
                        preceding_hash = Some(record.record_hash);
                    }
                    Err(_) => {
                        // An unreadable line severs the anchor for whatever
                        // follows it.
                        preceding_hash = None;
                    }
                },
                Some(v) => match parsed {
                    Ok(record) => {
                        v.push(&record)?;
                        if record.record_id == end_id {
                            found_end = true;
                            break;
                        }
                    }
                    Err(_) => v.push_unreadable(&line),
                },
            }
        }

        match verifier {
            None => Err(AuditError::RecordNotFound(start_id.to_string())),
            Some(_) if !found_end => Err(AuditError::RecordNotFound(end_id.to_string())),
            Some(v) => Ok(v.finish()),
        }
    }

    async fn apply_retention(&self, dry_run: bool) -> Result<RetentionReport, AuditError> {
        self.ensure_open()?;
        let mut report = RetentionReport::new(dry_run);
        let now = Utc::now();

        let cutoffs: HashMap<String, chrono::DateTime<Utc>> = {
            let schemas = self.schemas.read().expect("schema index poisoned");
            schemas
                .values()
                .filter_map(|s| retention_cutoff(s, now).map(|c| (s.schema_id(), c)))
                .collect()
        };

        // Sweeps and appends must not interleave destructively.
        let mut state = self.write.lock().await;

        let file = match File::open(&self.records_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let known_schemas: std::collections::HashSet<String> = {
            let schemas = self.schemas.read().expect("schema index poisoned");
            schemas.keys().cloned().collect()
        };

        // Kept lines stream straight into the replacement file so the sweep
        // never materializes the log in memory.
        let tmp_path = self.records_path.with_extension("jsonl.tmp");
        let mut tmp = if dry_run {
            None
        } else {
            Some(File::create(&tmp_path).await?)
        };

        let mut last_kept_hash = GENESIS_HASH.to_string();
        let mut lines = BufReader::new(file).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let kept_hash = match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => {
                    let schema_id =
                        format!("{}:v{}", record.schema_name, record.schema_version);

                    if !known_schemas.contains(&schema_id) {
                        report.failures.insert(
                            schema_id,
                            "schema not found; records preserved".to_string(),
                        );
                        Some(record.record_hash)
                    } else {
                        let expired = cutoffs
                            .get(&schema_id)
                            .map(|cutoff| record.timestamp < *cutoff)
                            .unwrap_or(false);
                        if expired {
                            *report.deleted.entry(schema_id).or_insert(0) += 1;
                            continue;
                        }
                        Some(record.record_hash)
                    }
                }
                Err(_) => {
                    // Never delete what we cannot read.
                    report.unreadable_lines += 1;
                    None
                }
            };

            if let Some(hash) = kept_hash {
                last_kept_hash = hash;
            }
            if let Some(ref mut tmp) = tmp {
                tmp.write_all(line.as_bytes()).await?;
                tmp.write_all(b"\n").await?;
            }
        }

        let Some(mut tmp) = tmp else {
            return Ok(report);
        };

        if report.total() == 0 {
            drop(tmp);
            fs::remove_file(&tmp_path).await?;
            return Ok(report);
        }

        tmp.flush().await?;
        drop(tmp);
        fs::rename(&tmp_path, &self.records_path).await?;

        state.last_hash = last_kept_hash;
        Ok(report)
    }

    async fn close(&self) -> Result<(), AuditError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
