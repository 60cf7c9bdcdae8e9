//! Result Publisher
//!
//! Builds one outbound message per product group and hands it to a
//! [`MessagePublisher`]. Publishing is fire-and-forget for the pipeline:
//! a failed send is logged and never turns a processed scene into a failure.
//!
//! | Product | Level | Roles                                | format / type   |
//! |---------|-------|--------------------------------------|-----------------|
//! | MODIS   | 1b    | geolocation, 1 km, 500 m, 250 m      | `EOS` / `HDF4`  |
//! | MODIS   | 1a    | level-1a                             | `EOS` / `HDF4`  |
//! | AAPP    | 1b    | MSU, AMSU-A, AMSU-B/MHS, HIRS        | `AAPP` / `binary` |

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::RunnerConfig;
use crate::types::{
    DatasetItem, MessageKind, OutboundMessage, OutputRole, ProcessingLevel, ProcessingResult, ProductFamily,
};

const MODIS_L1B_ROLES: [OutputRole; 4] = [
    OutputRole::GeoFile,
    OutputRole::Level1b1km,
    OutputRole::Level1b500m,
    OutputRole::Level1b250m,
];
const MODIS_L1A_ROLES: [OutputRole; 1] = [OutputRole::Level1a];
const AAPP_L1B_ROLES: [OutputRole; 4] = [OutputRole::Msu, OutputRole::AmsuA, OutputRole::AmsuB, OutputRole::Hirs];

// ============================================================================
// Message Construction
// ============================================================================

/// Topic layout: `/{format}/{level}/{site}/{mode}/{category}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    pub site: String,
    pub mode: String,
    pub category: String,
}

impl TopicLayout {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            site: config.publish.site.clone(),
            mode: config.server.mode.clone(),
            category: config.publish.category.clone(),
        }
    }

    pub fn subject(&self, format: &str, level: ProcessingLevel) -> String {
        format!("/{}/{}/{}/{}/{}", format, level, self.site, self.mode, self.category)
    }
}

/// `file://` URI of a local path
fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn uid(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// How a group of output files is published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    /// `file` for a single path, `dataset` for several
    ByCount,
    /// `dataset` even for a single path
    Dataset,
}

/// Build one message from inbound metadata and a group of output paths.
///
/// The metadata is copied; `uri`/`uid` describe a single path, `dataset`
/// replaces them for several.
pub fn create_message(
    metadata: &Map<String, Value>,
    paths: &[&Path],
    level: ProcessingLevel,
    format: &str,
    data_type: &str,
    layout: &TopicLayout,
) -> OutboundMessage {
    grouped_message(metadata, paths, Grouping::ByCount, level, format, data_type, layout)
}

fn grouped_message(
    metadata: &Map<String, Value>,
    paths: &[&Path],
    grouping: Grouping,
    level: ProcessingLevel,
    format: &str,
    data_type: &str,
    layout: &TopicLayout,
) -> OutboundMessage {
    let mut data = metadata.clone();
    let kind = if let (Grouping::ByCount, [path]) = (grouping, paths) {
        data.insert("uri".to_string(), Value::String(file_uri(path)));
        data.insert("uid".to_string(), Value::String(uid(path)));
        MessageKind::File
    } else {
        data.remove("uri");
        data.remove("uid");
        let dataset: Vec<DatasetItem> = paths
            .iter()
            .map(|p| DatasetItem {
                uri: file_uri(p),
                uid: uid(p),
            })
            .collect();
        data.insert(
            "dataset".to_string(),
            serde_json::to_value(dataset).unwrap_or(Value::Array(Vec::new())),
        );
        MessageKind::Dataset
    };

    data.insert("format".to_string(), Value::String(format.to_string()));
    data.insert(
        "data_processing_level".to_string(),
        Value::String(level.as_str().to_string()),
    );
    data.insert("type".to_string(), Value::String(data_type.to_string()));

    OutboundMessage {
        subject: layout.subject(format, level),
        kind,
        data,
    }
}

/// All messages for a completed pipeline, in publishing order.
///
/// Groups without any produced file are skipped. AAPP output is always a
/// dataset, however many instruments were calibrated.
pub fn build_messages(
    metadata: &Map<String, Value>,
    result: &ProcessingResult,
    layout: &TopicLayout,
) -> Vec<OutboundMessage> {
    let groups: &[(&[OutputRole], Grouping, ProcessingLevel, &str, &str)] = match result.product {
        ProductFamily::Modis => &[
            (&MODIS_L1B_ROLES, Grouping::ByCount, ProcessingLevel::L1b, "EOS", "HDF4"),
            (&MODIS_L1A_ROLES, Grouping::ByCount, ProcessingLevel::L1a, "EOS", "HDF4"),
        ],
        ProductFamily::Aapp => &[(&AAPP_L1B_ROLES, Grouping::Dataset, ProcessingLevel::L1b, "AAPP", "binary")],
    };

    groups
        .iter()
        .filter_map(|(roles, grouping, level, format, data_type)| {
            let paths: Vec<&Path> = roles.iter().filter_map(|r| result.get(*r)).collect();
            (!paths.is_empty())
                .then(|| grouped_message(metadata, &paths, *grouping, *level, format, data_type, layout))
        })
        .collect()
}

// ============================================================================
// Publisher Trait
// ============================================================================

/// Where outbound messages go.
#[async_trait]
pub trait MessagePublisher: Send {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<()>;

    /// Human-readable name for logging
    fn publisher_name(&self) -> &str;
}

/// Writes one JSON message per line (stdout, a file, any async writer).
pub struct JsonLinesPublisher<W> {
    writer: W,
    name: String,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesPublisher<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout(), "stdout")
    }
}

impl JsonLinesPublisher<tokio::fs::File> {
    /// Append to `path`, creating it if needed.
    pub async fn append(path: &Path) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessagePublisher for JsonLinesPublisher<W> {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<()> {
        let mut line = message.encode()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        debug!(subject = %message.subject, "Message written");
        Ok(())
    }

    fn publisher_name(&self) -> &str {
        &self.name
    }
}

/// Forwards messages into an in-process channel.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessagePublisher for ChannelPublisher {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<()> {
        self.tx
            .send(message.clone())
            .map_err(|_| anyhow::anyhow!("message channel closed"))
    }

    fn publisher_name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> TopicLayout {
        TopicLayout {
            site: "norrköping".to_string(),
            mode: "dev".to_string(),
            category: "polar/direct_readout".to_string(),
        }
    }

    fn metadata() -> Map<String, Value> {
        json!({
            "platform_name": "EOS-Terra",
            "sensor": "modis",
            "uri": "ssh://safe/pds/P0420064AAAAAAAAAAAAAA14239075753001.PDS",
            "uid": "P0420064AAAAAAAAAAAAAA14239075753001.PDS",
            "orbit_number": 77803,
            "format": "PDS",
            "type": "binary"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn modis_result() -> ProcessingResult {
        let mut result = ProcessingResult::new(ProductFamily::Modis);
        result.insert(OutputRole::GeoFile, "/l1/MOD03.hdf");
        result.insert(OutputRole::Level1b1km, "/l1/MOD021KM.hdf");
        result.insert(OutputRole::Level1b500m, "/l1/MOD02HKM.hdf");
        result.insert(OutputRole::Level1b250m, "/l1/MOD02QKM.hdf");
        result.insert(OutputRole::Level1a, "/l1/MOD01.hdf");
        result
    }

    #[test]
    fn test_modis_result_gives_dataset_and_file() {
        let messages = build_messages(&metadata(), &modis_result(), &layout());
        assert_eq!(messages.len(), 2);

        let l1b = &messages[0];
        assert_eq!(l1b.subject, "/EOS/1b/norrköping/dev/polar/direct_readout");
        assert_eq!(l1b.kind, MessageKind::Dataset);
        assert!(l1b.uri().is_none());
        let uids: Vec<String> = l1b.dataset().into_iter().map(|d| d.uid).collect();
        assert_eq!(uids, ["MOD03.hdf", "MOD021KM.hdf", "MOD02HKM.hdf", "MOD02QKM.hdf"]);

        let l1a = &messages[1];
        assert_eq!(l1a.kind, MessageKind::File);
        assert_eq!(l1a.uri(), Some("file:///l1/MOD01.hdf"));
        assert_eq!(l1a.uid(), Some("MOD01.hdf"));
        assert_eq!(l1a.level(), Some("1a"));
        assert_eq!(l1a.data["format"], "EOS");
        assert_eq!(l1a.data["type"], "HDF4");
        // Inbound metadata is carried over
        assert_eq!(l1a.data["orbit_number"], 77803);
    }

    #[test]
    fn test_aapp_result_is_always_a_dataset() {
        let mut result = ProcessingResult::new(ProductFamily::Aapp);
        result.insert(OutputRole::Hirs, "/aapp/hrsn.l1b");
        let messages = build_messages(&metadata(), &result, &layout());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::Dataset);
        assert_eq!(messages[0].subject, "/AAPP/1b/norrköping/dev/polar/direct_readout");
        assert!(messages[0].uri().is_none());
        let uids: Vec<String> = messages[0].dataset().into_iter().map(|d| d.uid).collect();
        assert_eq!(uids, ["hrsn.l1b"]);

        result.insert(OutputRole::AmsuA, "/aapp/aman.l1b");
        let messages = build_messages(&metadata(), &result, &layout());
        assert_eq!(messages[0].kind, MessageKind::Dataset);
        assert_eq!(messages[0].dataset().len(), 2);
    }

    #[test]
    fn test_empty_result_publishes_nothing() {
        let result = ProcessingResult::new(ProductFamily::Aapp);
        assert!(build_messages(&metadata(), &result, &layout()).is_empty());
    }

    #[tokio::test]
    async fn test_json_lines_publisher() {
        let mut publisher = JsonLinesPublisher::new(Vec::new(), "memory");
        for message in build_messages(&metadata(), &modis_result(), &layout()) {
            publisher.publish(&message).await.unwrap();
        }
        let text = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: OutboundMessage = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, MessageKind::Dataset);
    }

    #[tokio::test]
    async fn test_channel_publisher() {
        let (mut publisher, mut rx) = ChannelPublisher::new();
        let message = create_message(
            &metadata(),
            &[Path::new("/l1/MOD01.hdf")],
            ProcessingLevel::L1a,
            "EOS",
            "HDF4",
            &layout(),
        );
        publisher.publish(&message).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), message);

        drop(rx);
        assert!(publisher.publish(&message).await.is_err());
    }
}
