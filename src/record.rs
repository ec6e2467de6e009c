//! Line-oriented backup format
//!
//! One retained message per line: a JSON object with `topic`, a base64 `payload`,
//! the `retain` flag and whatever protocol metadata (`qos`, `messageId`) the
//! original delivery carried. Lines are appended during backup and replayed in
//! file order during restore.

use crate::transport::mqtt::Delivery;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Record codec errors
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Malformed record: {reason}")]
    Malformed { reason: String },

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One retained message snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub topic: String,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub retain: bool,
    /// Protocol metadata carried through without interpretation
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl BackupRecord {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
            metadata: Map::new(),
        }
    }

    /// Snapshot a broker delivery, keeping its QoS and packet id as metadata
    pub fn from_delivery(delivery: &Delivery) -> Self {
        let mut metadata = Map::new();
        metadata.insert("qos".to_string(), Value::from(delivery.qos));
        metadata.insert("messageId".to_string(), Value::from(delivery.pkid));

        Self {
            topic: delivery.topic.clone(),
            payload: delivery.payload.to_vec(),
            retain: delivery.retain,
            metadata,
        }
    }
}

/// Encode a record as one JSON line, newline included
pub fn encode(record: &BackupRecord) -> Result<String, RecordError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line of a backup file
pub fn decode(line: &str) -> Result<BackupRecord, RecordError> {
    serde_json::from_str(line.trim_end_matches(['\n', '\r'])).map_err(|e| {
        RecordError::Malformed {
            reason: e.to_string(),
        }
    })
}

mod base64_payload {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Append-only backup file. Every record is written and flushed before the next
/// one is accepted.
#[derive(Debug)]
pub struct BackupWriter {
    file: File,
    path: PathBuf,
    written: u64,
}

impl BackupWriter {
    /// Open for appending, creating the file if needed
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        debug!("Appending backup records to {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    pub async fn append(&mut self, record: &BackupRecord) -> Result<(), crate::error::CliError> {
        let line = encode(record)?;
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_encode_is_single_line() {
        let record = BackupRecord::new("a/b\nc", b"hi".to_vec(), true);
        let line = encode(&record).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_payload_is_base64() {
        let record = BackupRecord::new("a/b", b"hi".to_vec(), true);
        let line = encode(&record).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["payload"], "aGk=");
        assert_eq!(value["topic"], "a/b");
        assert_eq!(value["retain"], true);
    }

    #[test]
    fn test_round_trip_non_utf8_payload() {
        let record = BackupRecord::new("bin", vec![0xff, 0x00, 0xfe], false);
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_metadata_passes_through() {
        let line = r#"{"topic":"t","payload":"","retain":true,"qos":1,"messageId":42}"#;
        let record = decode(line).unwrap();
        assert!(record.payload.is_empty());
        assert_eq!(record.metadata["qos"], 1);
        assert_eq!(record.metadata["messageId"], 42);

        let reencoded: Value = serde_json::from_str(&encode(&record).unwrap()).unwrap();
        assert_eq!(reencoded["messageId"], 42);
    }

    #[test]
    fn test_missing_payload_is_malformed() {
        assert!(matches!(
            decode(r#"{"topic":"t","retain":true}"#),
            Err(RecordError::Malformed { .. })
        ));
    }

    #[test]
    fn test_invalid_json_and_base64_are_malformed() {
        assert!(matches!(decode("not json"), Err(RecordError::Malformed { .. })));
        assert!(matches!(
            decode(r#"{"topic":"t","payload":"@@@","retain":true}"#),
            Err(RecordError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_retain_defaults_to_false() {
        let record = decode(r#"{"topic":"t","payload":"aGk="}"#).unwrap();
        assert!(!record.retain);
    }

    #[test]
    fn test_from_delivery_keeps_metadata() {
        let delivery = Delivery {
            topic: "a/b".to_string(),
            payload: Bytes::from_static(b"hi"),
            retain: true,
            qos: 1,
            pkid: 9,
        };
        let record = BackupRecord::from_delivery(&delivery);
        assert_eq!(record.topic, "a/b");
        assert_eq!(record.payload, b"hi");
        assert_eq!(record.metadata["qos"], 1);
        assert_eq!(record.metadata["messageId"], 9);
    }

    #[tokio::test]
    async fn test_writer_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.jsonl");

        let mut writer = BackupWriter::open(&path).await.unwrap();
        writer
            .append(&BackupRecord::new("one", b"1".to_vec(), true))
            .await
            .unwrap();
        assert_eq!(writer.records_written(), 1);
        drop(writer);

        let mut writer = BackupWriter::open(&path).await.unwrap();
        writer
            .append(&BackupRecord::new("two", b"2".to_vec(), true))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let topics: Vec<String> = contents
            .lines()
            .map(|line| decode(line).unwrap().topic)
            .collect();
        assert_eq!(topics, vec!["one", "two"]);
    }
}
