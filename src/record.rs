//! Incident persistence.
//!
//! A fired alert produces three artifacts: an annotated JPEG snapshot under
//! `snapshots/<Category_Dir>/`, a JSON sidecar next to it, and a row in the
//! incident index. The index is behind a trait with a SQLite implementation
//! and an in-memory implementation for tests. Records are immutable once
//! written.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::frame::Frame;
use crate::incident::Evidence;
use crate::{now_s, IncidentCategory};

const SNAPSHOT_JPEG_QUALITY: u8 = 85;

/// One persisted incident, as stored in the index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub category: IncidentCategory,
    pub timestamp: u64,
    pub description: String,
    pub snapshot_path: String,
    pub evidence: Evidence,
    /// Hex SHA-256 of the snapshot bytes, for after-the-fact integrity checks.
    pub snapshot_sha256: String,
}

/// The listing view returned to callers: one row per persisted incident.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub category: IncidentCategory,
    pub timestamp: u64,
    pub description: String,
    pub snapshot_path: String,
}

/// Incident index boundary.
pub trait IncidentStore: Send {
    fn append(&mut self, record: &IncidentRecord) -> Result<()>;

    fn list(&mut self) -> Result<Vec<IncidentSummary>>;
}

// ----------------------------------------------------------------------------
// SQLite index
// ----------------------------------------------------------------------------

pub struct SqliteIncidentStore {
    conn: Connection,
}

impl SqliteIncidentStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open incident index {}", db_path))?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS incidents (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              category TEXT NOT NULL,
              description TEXT NOT NULL,
              snapshot_path TEXT NOT NULL,
              evidence_json TEXT NOT NULL,
              snapshot_sha256 TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at);
            "#,
        )?;
        Ok(())
    }
}

impl IncidentStore for SqliteIncidentStore {
    fn append(&mut self, record: &IncidentRecord) -> Result<()> {
        let created_at = i64::try_from(record.timestamp)
            .map_err(|_| anyhow!("incident timestamp exceeds i64 range"))?;
        let evidence_json = serde_json::to_string(&record.evidence)?;
        self.conn.execute(
            r#"
            INSERT INTO incidents(created_at, category, description, snapshot_path, evidence_json, snapshot_sha256)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                created_at,
                record.category.as_str(),
                record.description,
                record.snapshot_path,
                evidence_json,
                record.snapshot_sha256,
            ],
        )?;
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<IncidentSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at, category, description, snapshot_path FROM incidents ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let created_at: i64 = row.get(0)?;
            let category: String = row.get(1)?;
            let category = IncidentCategory::parse(&category)
                .ok_or_else(|| anyhow!("corrupt incident index: unknown category '{}'", category))?;
            out.push(IncidentSummary {
                category,
                timestamp: created_at as u64,
                description: row.get(2)?,
                snapshot_path: row.get(3)?,
            });
        }
        Ok(out)
    }
}

// ----------------------------------------------------------------------------
// In-memory index (tests)
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryIncidentStore {
    records: Vec<IncidentRecord>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }
}

impl IncidentStore for InMemoryIncidentStore {
    fn append(&mut self, record: &IncidentRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<IncidentSummary>> {
        Ok(self
            .records
            .iter()
            .map(|r| IncidentSummary {
                category: r.category,
                timestamp: r.timestamp,
                description: r.description.clone(),
                snapshot_path: r.snapshot_path.clone(),
            })
            .collect())
    }
}

// ----------------------------------------------------------------------------
// Recorder
// ----------------------------------------------------------------------------

/// JSON sidecar written next to every snapshot.
#[derive(Serialize)]
struct IncidentSidecar<'a> {
    category: IncidentCategory,
    timestamp: u64,
    description: &'a str,
    evidence: &'a Evidence,
    snapshot_sha256: &'a str,
}

/// Writes snapshot + sidecar artifacts and indexes them.
pub struct IncidentRecorder {
    snapshot_root: PathBuf,
    store: Box<dyn IncidentStore>,
}

impl IncidentRecorder {
    pub fn new<P: Into<PathBuf>>(snapshot_root: P, store: Box<dyn IncidentStore>) -> Self {
        Self {
            snapshot_root: snapshot_root.into(),
            store,
        }
    }

    /// Persist one incident: encode the (already annotated) frame, write the
    /// snapshot and sidecar, and index the record. Returns the snapshot path.
    pub fn record(
        &mut self,
        frame: &Frame,
        category: IncidentCategory,
        description: &str,
        evidence: &Evidence,
    ) -> Result<PathBuf> {
        let timestamp = now_s()?;
        let jpeg = encode_jpeg(frame)?;
        let sha256 = hex::encode(Sha256::digest(&jpeg));

        let dir = self.snapshot_root.join(category.dir_name());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;

        let stem = format!("{}_f{}_{}", timestamp, frame.seq, category.dir_name());
        let snapshot_path = dir.join(format!("{}.jpg", stem));
        std::fs::write(&snapshot_path, &jpeg)
            .with_context(|| format!("failed to write snapshot {}", snapshot_path.display()))?;

        let sidecar = IncidentSidecar {
            category,
            timestamp,
            description,
            evidence,
            snapshot_sha256: &sha256,
        };
        let sidecar_path = dir.join(format!("{}.json", stem));
        std::fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar)?)
            .with_context(|| format!("failed to write sidecar {}", sidecar_path.display()))?;

        let record = IncidentRecord {
            category,
            timestamp,
            description: description.to_string(),
            snapshot_path: snapshot_path.to_string_lossy().into_owned(),
            evidence: evidence.clone(),
            snapshot_sha256: sha256,
        };
        self.store.append(&record)?;

        Ok(snapshot_path)
    }

    pub fn list(&mut self) -> Result<Vec<IncidentSummary>> {
        self.store.list()
    }
}

fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let rgb = frame.to_rgb();
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, SNAPSHOT_JPEG_QUALITY);
    encoder
        .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .context("failed to encode snapshot jpeg")?;
    Ok(jpeg)
}

/// List incidents straight from an index path, for read-only consumers
/// (the API server and the export CLI open their own connections).
pub fn list_incidents(db_path: &str) -> Result<Vec<IncidentSummary>> {
    let mut store = SqliteIncidentStore::open(db_path)?;
    store.list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;
    use crate::signal::DangerousObject;

    fn test_frame() -> Frame {
        Frame::new(vec![64u8; 32 * 24 * 3], 32, 24, 7, 0).unwrap()
    }

    fn knife_evidence() -> Evidence {
        Evidence {
            objects: vec![DangerousObject {
                label: "knife".to_string(),
                confidence: 0.82,
                bbox: BoundingBox::new(2, 2, 12, 12),
            }],
            ..Evidence::default()
        }
    }

    #[test]
    fn record_writes_snapshot_sidecar_and_index_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder =
            IncidentRecorder::new(dir.path(), Box::new(InMemoryIncidentStore::new()));

        let path = recorder
            .record(
                &test_frame(),
                IncidentCategory::Weapons,
                "Dangerous objects detected: knife (0.82)",
                &knife_evidence(),
            )
            .expect("record incident");

        assert!(path.starts_with(dir.path().join("Dangerous_Objects")));
        let jpeg = std::fs::read(&path).expect("snapshot exists");
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8], "jpeg magic");

        let sidecar_path = path.with_extension("json");
        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(sidecar_path).expect("sidecar exists")).unwrap();
        assert_eq!(sidecar["category"], "weapons");
        assert_eq!(sidecar["evidence"]["objects"][0]["label"], "knife");
        assert_eq!(
            sidecar["snapshot_sha256"].as_str().unwrap(),
            hex::encode(Sha256::digest(&jpeg))
        );

        let listed = recorder.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].category, IncidentCategory::Weapons);
        assert_eq!(listed[0].snapshot_path, path.to_string_lossy());
    }

    #[test]
    fn sqlite_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("incidents.db");
        let db_path = db_path.to_str().unwrap();

        {
            let mut store = SqliteIncidentStore::open(db_path).unwrap();
            store
                .append(&IncidentRecord {
                    category: IncidentCategory::ViolentPoses,
                    timestamp: 1700000000,
                    description: "Person 1 showing fighting stance".to_string(),
                    snapshot_path: "snapshots/Violent_Poses/x.jpg".to_string(),
                    evidence: Evidence::default(),
                    snapshot_sha256: "00".to_string(),
                })
                .unwrap();
        }

        let listed = list_incidents(db_path).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].category, IncidentCategory::ViolentPoses);
        assert_eq!(listed[0].timestamp, 1700000000);
    }

    #[test]
    fn unwritable_snapshot_root_is_a_persistence_failure() {
        let mut recorder = IncidentRecorder::new(
            "/proc/definitely/not/writable",
            Box::new(InMemoryIncidentStore::new()),
        );
        let result = recorder.record(
            &test_frame(),
            IncidentCategory::Violence,
            "Violence detected with confidence 0.80",
            &Evidence::default(),
        );
        assert!(result.is_err());
    }
}
