//! Persistence collaborator: stored frames and analysis records.
//!
//! Writes are at-least-once and not transactional. An image can be stored and
//! its record then fail, leaving an orphaned image; records are for human review,
//! so that gap is accepted rather than papered over.

use crate::error::PersistenceError;
use crate::models::CameraId;
use crate::pipeline::{Severity, Verdict};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub type RecordId = u64;

const IMAGES_DIR: &str = "images";
const RECORDS_FILE: &str = "analysis_records.jsonl";

/// Encodes an RGB image as JPEG at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    Ok(bytes)
}

/// A verdict as persisted: triage bucket plus review flags for the operator UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedVerdict {
    pub verdict: Verdict,
    pub severity: Severity,
    pub human_verified: bool,
    pub resolved: bool,
}

impl From<Verdict> for RecordedVerdict {
    fn from(verdict: Verdict) -> Self {
        Self {
            severity: Severity::of(&verdict),
            verdict,
            human_verified: false,
            resolved: false,
        }
    }
}

/// One stored frame with the verdicts produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub record_id: RecordId,
    pub camera_id: CameraId,
    pub image_path: String,
    pub captured_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
    pub verdicts: Vec<RecordedVerdict>,
}

pub trait PersistenceSink: Send + Sync {
    /// Stores an encoded frame and returns where it was put.
    fn store_image(
        &self,
        camera_id: &CameraId,
        captured_at: DateTime<Utc>,
        jpeg: &[u8],
    ) -> Result<String, PersistenceError>;

    /// Stores one record referencing a previously stored image.
    fn store_analysis_record(
        &self,
        camera_id: &CameraId,
        image_path: &str,
        captured_at: DateTime<Utc>,
        verdicts: Vec<RecordedVerdict>,
    ) -> Result<RecordId, PersistenceError>;
}

struct RecordLog {
    file: File,
    next_id: RecordId,
}

/// Images under `<root>/images/`, records appended to `<root>/analysis_records.jsonl`.
pub struct FsSink {
    images_dir: PathBuf,
    records_path: PathBuf,
    log: Mutex<RecordLog>,
}

impl FsSink {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let root = root.as_ref();
        let images_dir = root.join(IMAGES_DIR);
        fs::create_dir_all(&images_dir)?;

        let records_path = root.join(RECORDS_FILE);
        let next_id = last_record_id(&records_path)?.map_or(1, |id| id + 1);
        let mut file = OpenOptions::new().create(true).append(true).open(&records_path)?;
        // A crash mid-append leaves an unterminated line; close it off so the next
        // record starts on a line of its own.
        if ends_mid_line(&records_path)? {
            tracing::warn!(path = %records_path.display(), "Record log ends with a partial line");
            file.write_all(b"\n")?;
        }

        Ok(Self {
            images_dir,
            records_path,
            log: Mutex::new(RecordLog { file, next_id }),
        })
    }

    /// Reads back every stored record. Lines that do not parse are skipped.
    pub fn read_records(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
        let file = File::open(&self.records_path)?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(line = index + 1, error = %e, "Skipping unreadable analysis record"),
            }
        }
        Ok(records)
    }
}

/// Highest record id in an existing log, so ids keep increasing across restarts.
fn last_record_id(path: &Path) -> Result<Option<RecordId>, PersistenceError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut last = None;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let id = serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .and_then(|value| value.get("record_id").and_then(|id| id.as_u64()));
        if let Some(id) = id {
            last = Some(last.map_or(id, |current: RecordId| current.max(id)));
        }
    }
    Ok(last)
}

fn ends_mid_line(path: &Path) -> Result<bool, PersistenceError> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn file_safe(id: &CameraId) -> String {
    id.as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

impl PersistenceSink for FsSink {
    fn store_image(
        &self,
        camera_id: &CameraId,
        captured_at: DateTime<Utc>,
        jpeg: &[u8],
    ) -> Result<String, PersistenceError> {
        let stem = format!(
            "camera_{}_{}",
            file_safe(camera_id),
            captured_at.format("%Y%m%d_%H%M%S_%3f")
        );

        // Two frames from one camera can share a millisecond; never overwrite.
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.jpg")
            } else {
                format!("{stem}_{attempt}.jpg")
            };
            let path = self.images_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(jpeg)?;
                    file.sync_data()?;
                    return Ok(path.to_string_lossy().into_owned());
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 1_000 => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn store_analysis_record(
        &self,
        camera_id: &CameraId,
        image_path: &str,
        captured_at: DateTime<Utc>,
        verdicts: Vec<RecordedVerdict>,
    ) -> Result<RecordId, PersistenceError> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| PersistenceError::Unavailable("record log poisoned".into()))?;

        let record = AnalysisRecord {
            record_id: log.next_id,
            camera_id: camera_id.clone(),
            image_path: image_path.to_string(),
            captured_at,
            stored_at: Utc::now(),
            verdicts,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let committed_len = log.file.metadata()?.len();
        let written = log.file.write_all(&line).and_then(|()| log.file.flush());
        if let Err(e) = written {
            // Drop whatever part of the line made it out.
            if let Err(truncate) = log.file.set_len(committed_len) {
                tracing::error!(error = %truncate, "Failed to roll back partial analysis record");
            }
            return Err(e.into());
        }

        log.next_id += 1;
        Ok(record.record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{AnalysisKind, VerdictDetails};
    use image::Rgb;

    fn fire_verdict(fraction: f64) -> Verdict {
        Verdict {
            kind: AnalysisKind::Fire,
            label: if fraction > 0.05 { "fire" } else { "no_fire" }.into(),
            confidence: fraction,
            flagged: fraction > 0.05,
            details: VerdictDetails::Fire {
                fire_fraction: fraction,
                threshold: 0.05,
            },
        }
    }

    #[test]
    fn recorded_verdicts_start_unreviewed() {
        let recorded = RecordedVerdict::from(fire_verdict(0.9));
        assert_eq!(recorded.severity, Severity::High);
        assert!(!recorded.human_verified);
        assert!(!recorded.resolved);
    }

    #[test]
    fn images_use_camera_and_timestamp_names_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::open(dir.path()).unwrap();
        let at = "2026-03-01T12:30:45.123Z".parse::<DateTime<Utc>>().unwrap();
        let jpeg = encode_jpeg(&RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])), 90).unwrap();

        let first = sink.store_image(&CameraId::from("lobby/1"), at, &jpeg).unwrap();
        let second = sink.store_image(&CameraId::from("lobby/1"), at, &jpeg).unwrap();

        assert!(first.ends_with("camera_lobby_1_20260301_123045_123.jpg"), "{first}");
        assert!(second.ends_with("camera_lobby_1_20260301_123045_123_1.jpg"), "{second}");
        assert_eq!(std::fs::read(&first).unwrap(), jpeg);
    }

    #[test]
    fn records_are_appended_with_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::open(dir.path()).unwrap();
        let camera = CameraId::from("7");

        let a = sink
            .store_analysis_record(&camera, "a.jpg", Utc::now(), vec![fire_verdict(0.01).into()])
            .unwrap();
        let b = sink
            .store_analysis_record(&camera, "b.jpg", Utc::now(), vec![fire_verdict(0.3).into()])
            .unwrap();
        assert_eq!((a, b), (1, 2));

        let records = sink.read_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].image_path, "b.jpg");
        assert_eq!(records[1].verdicts[0].severity, Severity::Low);
        assert_eq!(records[0].verdicts[0].severity, Severity::Nothing);
    }

    #[test]
    fn partial_trailing_line_does_not_swallow_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let good = {
            let sink = FsSink::open(dir.path()).unwrap();
            sink.store_analysis_record(&CameraId::from("1"), "a.jpg", Utc::now(), Vec::new())
                .unwrap();
            sink.read_records().unwrap()
        };
        assert_eq!(good.len(), 1);

        // Simulate a crash halfway through appending the second record.
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(RECORDS_FILE))
            .unwrap();
        file.write_all(br#"{"record_id":2,"camera_id":"1","image_pa"#).unwrap();
        drop(file);

        let sink = FsSink::open(dir.path()).unwrap();
        let id = sink
            .store_analysis_record(&CameraId::from("1"), "c.jpg", Utc::now(), Vec::new())
            .unwrap();
        assert_eq!(id, 2);

        let records = sink.read_records().unwrap();
        let paths: Vec<&str> = records.iter().map(|r| r.image_path.as_str()).collect();
        assert_eq!(paths, vec!["a.jpg", "c.jpg"]);
    }

    #[test]
    fn record_ids_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sink = FsSink::open(dir.path()).unwrap();
            sink.store_analysis_record(&CameraId::from("1"), "x.jpg", Utc::now(), Vec::new())
                .unwrap();
        }
        let sink = FsSink::open(dir.path()).unwrap();
        let id = sink
            .store_analysis_record(&CameraId::from("1"), "y.jpg", Utc::now(), Vec::new())
            .unwrap();
        assert_eq!(id, 2);
    }
}
