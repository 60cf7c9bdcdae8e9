//! Shared data structures for the level-1 direct readout runner
//!
//! This module defines the message and product types that flow through the
//! controller:
//! - Inbound: `InboundMessage` (raw metadata) and `FileEvent` (typed view)
//! - Platforms: `Platform` and its `SceneFamily`
//! - Products: `ProcessingResult`, `OutputRole`, `ProcessingLevel`
//! - Outbound: `OutboundMessage`, `DatasetItem`

use chrono::NaiveDateTime;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Inbound message decoding errors
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message payload is not a JSON object")]
    NotAnObject,

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid value for field '{field}': {message}")]
    InvalidField { field: &'static str, message: String },
}

// ============================================================================
// Inbound Messages
// ============================================================================

/// A file-dispatch notification as received from the transport.
///
/// `data` keeps the complete metadata so outbound messages can mirror it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
    pub data: Map<String, Value>,
}

fn default_message_type() -> String {
    "file".to_string()
}

impl InboundMessage {
    /// Build a message from a metadata object.
    pub fn new(subject: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            subject: subject.into(),
            kind: default_message_type(),
            data,
        }
    }

    /// Decode a JSON line: either a `{subject, type, data}` envelope or a
    /// bare metadata object.
    pub fn from_json(line: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(line)?;
        let Value::Object(mut object) = value else {
            return Err(MessageError::NotAnObject);
        };

        if let Some(Value::Object(data)) = object.remove("data") {
            let subject = object
                .get("subject")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let kind = object
                .get("type")
                .and_then(Value::as_str)
                .map_or_else(default_message_type, str::to_string);
            return Ok(Self { subject, kind, data });
        }

        Ok(Self::new("", object))
    }

    fn str_field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.data.get(*k))
            .and_then(Value::as_str)
    }
}

/// Typed view of the fields the controller needs from an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    /// Full URI as received
    pub uri: String,
    /// URI authority (server the file was dispatched from); empty for bare paths
    pub host: String,
    /// Local filesystem path of the dispatched file
    pub path: PathBuf,
    pub platform_name: String,
    pub sensors: Vec<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub orbit_number: Option<u32>,
}

impl FileEvent {
    /// Extract the typed event from a raw message.
    ///
    /// `satellite` and `instrument` are accepted as aliases of
    /// `platform_name` and `sensor`.
    pub fn from_message(message: &InboundMessage) -> Result<Self, MessageError> {
        let uri = message
            .str_field(&["uri"])
            .ok_or(MessageError::MissingField("uri"))?
            .to_string();
        let (host, path) = split_uri(&uri)?;

        let platform_name = message
            .str_field(&["platform_name", "satellite"])
            .ok_or(MessageError::MissingField("platform_name"))?
            .to_string();

        let sensors = match message.data.get("sensor").or_else(|| message.data.get("instrument")) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => return Err(MessageError::MissingField("sensor")),
        };

        let start_time = optional_time(message, "start_time")?;
        let end_time = optional_time(message, "end_time")?;

        let orbit_number = match message.data.get("orbit_number") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| MessageError::InvalidField {
                        field: "orbit_number",
                        message: n.to_string(),
                    })?,
            ),
            Some(Value::String(s)) => Some(s.trim().parse().map_err(|_| MessageError::InvalidField {
                field: "orbit_number",
                message: s.clone(),
            })?),
            Some(other) => {
                return Err(MessageError::InvalidField {
                    field: "orbit_number",
                    message: other.to_string(),
                })
            }
        };

        Ok(Self {
            uri,
            host,
            path,
            platform_name,
            sensors,
            start_time,
            end_time,
            orbit_number,
        })
    }

    /// Basename of the dispatched file
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// True if any of the message sensors matches (case-insensitive)
    pub fn has_sensor(&self, sensor: &str) -> bool {
        self.sensors.iter().any(|s| s.eq_ignore_ascii_case(sensor))
    }
}

fn optional_time(
    message: &InboundMessage,
    field: &'static str,
) -> Result<Option<NaiveDateTime>, MessageError> {
    match message.data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| MessageError::InvalidField {
                field,
                message: s.clone(),
            }),
        Some(other) => Err(MessageError::InvalidField {
            field,
            message: other.to_string(),
        }),
    }
}

/// Parse the timestamp formats seen in dispatch messages.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y%m%d%H%M%S"];
    let s = s.trim().trim_end_matches('Z');
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Split a URI into (authority, local path). Bare paths have no authority.
fn split_uri(uri: &str) -> Result<(String, PathBuf), MessageError> {
    if !uri.contains("://") {
        return Ok((String::new(), PathBuf::from(uri)));
    }
    let url = reqwest::Url::parse(uri).map_err(|e| MessageError::InvalidField {
        field: "uri",
        message: e.to_string(),
    })?;
    // Url keeps the path percent-encoded; the file on disk has the raw name
    let path = percent_decode_str(url.path())
        .decode_utf8()
        .map_err(|e| MessageError::InvalidField {
            field: "uri",
            message: e.to_string(),
        })?;
    Ok((
        url.host_str().unwrap_or_default().to_string(),
        PathBuf::from(path.as_ref()),
    ))
}

// ============================================================================
// Platforms
// ============================================================================

/// How a platform's downlink files form a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFamily {
    /// One dispatched file is a complete scene
    SingleFile,
    /// A primary data file and a packet (attitude/ephemeris) file make a scene
    Paired,
}

/// Satellite platform recognised by the controller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    /// EOS-Terra (MODIS, single-file scenes)
    Terra,
    /// EOS-Aqua (MODIS + GBAD packets, paired scenes)
    Aqua,
    /// NOAA / Metop platform, carrying the name AAPP expects (`noaa19`, `metop02`)
    Aapp(String),
}

impl Platform {
    /// Recognise a platform from the message `platform_name`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "eosterra" | "terra" => return Some(Self::Terra),
            "eosaqua" | "aqua" => return Some(Self::Aqua),
            "metopa" | "m02" => return Some(Self::Aapp("metop02".to_string())),
            "metopb" | "m01" => return Some(Self::Aapp("metop01".to_string())),
            "metopc" | "m03" => return Some(Self::Aapp("metop03".to_string())),
            _ => {}
        }

        let digits_after = |prefix: &str| {
            normalized
                .strip_prefix(prefix)
                .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
                .and_then(|rest| rest.parse::<u32>().ok())
        };

        if let Some(n) = digits_after("noaa") {
            return Some(Self::Aapp(format!("noaa{n:02}")));
        }
        if let Some(n) = digits_after("metop") {
            return Some(Self::Aapp(format!("metop{n:02}")));
        }
        None
    }

    pub fn family(&self) -> SceneFamily {
        match self {
            Self::Aqua => SceneFamily::Paired,
            Self::Terra | Self::Aapp(_) => SceneFamily::SingleFile,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Terra => write!(f, "Terra"),
            Platform::Aqua => write!(f, "Aqua"),
            Platform::Aapp(name) => write!(f, "{name}"),
        }
    }
}

// ============================================================================
// Processing Results
// ============================================================================

/// Product family a pipeline produces; selects the publishing layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductFamily {
    /// MODIS level-1 HDF4 products (EOS)
    Modis,
    /// AAPP calibrated level-1b instrument files
    Aapp,
}

/// Logical role of a produced output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRole {
    GeoFile,
    Level1b1km,
    Level1b500m,
    Level1b250m,
    Level1a,
    Hirs,
    AmsuA,
    AmsuB,
    Msu,
}

impl std::fmt::Display for OutputRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputRole::GeoFile => "geolocation file",
            OutputRole::Level1b1km => "1-km reflective/emissive file",
            OutputRole::Level1b500m => "500-m reflective file",
            OutputRole::Level1b250m => "250-m reflective file",
            OutputRole::Level1a => "level-1a file",
            OutputRole::Hirs => "HIRS level-1b file",
            OutputRole::AmsuA => "AMSU-A level-1b file",
            OutputRole::AmsuB => "AMSU-B/MHS level-1b file",
            OutputRole::Msu => "MSU level-1b file",
        };
        write!(f, "{name}")
    }
}

/// Output paths of a pipeline, keyed by role.
///
/// Built while the plan is selected, handed to the publisher once every
/// stage has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
    pub product: ProductFamily,
    outputs: BTreeMap<OutputRole, PathBuf>,
}

impl ProcessingResult {
    pub fn new(product: ProductFamily) -> Self {
        Self {
            product,
            outputs: BTreeMap::new(),
        }
    }

    /// Record the output path for a role, replacing any previous one.
    pub fn insert(&mut self, role: OutputRole, path: impl AsRef<Path>) {
        self.outputs.insert(role, path.as_ref().to_path_buf());
    }

    pub fn get(&self, role: OutputRole) -> Option<&Path> {
        self.outputs.get(&role).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutputRole, &Path)> {
        self.outputs.iter().map(|(role, path)| (*role, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

// ============================================================================
// Outbound Messages
// ============================================================================

/// Processing level tag of a published product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingLevel {
    #[serde(rename = "1a")]
    L1a,
    #[serde(rename = "1b")]
    L1b,
}

impl ProcessingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingLevel::L1a => "1a",
            ProcessingLevel::L1b => "1b",
        }
    }
}

impl std::fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message type: one path (`file`) or several (`dataset`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    File,
    Dataset,
}

/// One member of a dataset message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub uri: String,
    pub uid: String,
}

/// A result message ready for the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub subject: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub data: Map<String, Value>,
}

impl OutboundMessage {
    /// JSON encoding used by the line-oriented publishers
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The `uri` of a single-file message
    pub fn uri(&self) -> Option<&str> {
        self.data.get("uri").and_then(Value::as_str)
    }

    /// The `uid` of a single-file message
    pub fn uid(&self) -> Option<&str> {
        self.data.get("uid").and_then(Value::as_str)
    }

    /// Members of a dataset message (empty for single-file messages)
    pub fn dataset(&self) -> Vec<DatasetItem> {
        self.data
            .get("dataset")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// The `data_processing_level` tag
    pub fn level(&self) -> Option<&str> {
        self.data.get("data_processing_level").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERRA_MSG: &str = r#"{"subject": "/PDS/0/norrköping/dev/polar/direct_readout", "type": "file",
        "data": {"satellite": "TERRA", "format": "PDS", "start_time": "2014-08-27T07:57:53.0",
        "orbit_number": 78142, "instrument": "modis",
        "uri": "ssh://safe.smhi.se//san1/polar_in/direct_readout/eos/lvl0/P0420064AAAAAAAAAAAAAA14239075753001.PDS"}}"#;

    #[test]
    fn test_envelope_decoding_with_aliases() {
        let msg = InboundMessage::from_json(TERRA_MSG).unwrap();
        assert_eq!(msg.subject, "/PDS/0/norrköping/dev/polar/direct_readout");
        let event = FileEvent::from_message(&msg).unwrap();
        assert_eq!(event.host, "safe.smhi.se");
        assert_eq!(event.platform_name, "TERRA");
        assert!(event.has_sensor("MODIS"));
        assert_eq!(event.orbit_number, Some(78142));
        assert_eq!(event.file_name(), "P0420064AAAAAAAAAAAAAA14239075753001.PDS");
        assert_eq!(
            event.start_time.unwrap().format("%Y%m%d%H%M").to_string(),
            "201408270757"
        );
    }

    #[test]
    fn test_bare_object_and_plain_path() {
        let msg = InboundMessage::from_json(
            r#"{"uri": "/data/P1540064AAAAAAAAAAAAAA12298130323001.PDS", "platform_name": "AQUA",
                "sensor": ["modis", "gbad"]}"#,
        )
        .unwrap();
        let event = FileEvent::from_message(&msg).unwrap();
        assert_eq!(event.host, "");
        assert_eq!(event.sensors, vec!["modis", "gbad"]);
        assert!(event.start_time.is_none());
    }

    #[test]
    fn test_uri_path_is_percent_decoded() {
        let msg = InboundMessage::from_json(
            r#"{"uri": "ssh://safe/data/norrköping/my dir/P0420064AAAAAAAAAAAAAA14239075753001.PDS",
                "platform_name": "TERRA", "sensor": "modis"}"#,
        )
        .unwrap();
        let event = FileEvent::from_message(&msg).unwrap();
        assert_eq!(event.host, "safe");
        assert_eq!(
            event.path,
            PathBuf::from("/data/norrköping/my dir/P0420064AAAAAAAAAAAAAA14239075753001.PDS")
        );

        // Already-encoded input decodes to the same path
        let msg = InboundMessage::from_json(
            r#"{"uri": "ssh://safe/data/norrk%C3%B6ping/my%20dir/P0420064AAAAAAAAAAAAAA14239075753001.PDS",
                "platform_name": "TERRA", "sensor": "modis"}"#,
        )
        .unwrap();
        assert_eq!(FileEvent::from_message(&msg).unwrap().path, event.path);
    }

    #[test]
    fn test_uri_with_invalid_utf8_escape_is_rejected() {
        let msg = InboundMessage::from_json(
            r#"{"uri": "ssh://safe/data/%FF.PDS", "platform_name": "TERRA", "sensor": "modis"}"#,
        )
        .unwrap();
        assert!(matches!(
            FileEvent::from_message(&msg),
            Err(MessageError::InvalidField { field: "uri", .. })
        ));
    }

    #[test]
    fn test_missing_uri_is_rejected() {
        let msg = InboundMessage::from_json(r#"{"platform_name": "AQUA", "sensor": "modis"}"#).unwrap();
        assert!(matches!(
            FileEvent::from_message(&msg),
            Err(MessageError::MissingField("uri"))
        ));
    }

    #[test]
    fn test_bad_start_time_is_rejected() {
        let msg = InboundMessage::from_json(
            r#"{"uri": "/x", "platform_name": "AQUA", "sensor": "modis", "start_time": "yesterday"}"#,
        )
        .unwrap();
        assert!(matches!(
            FileEvent::from_message(&msg),
            Err(MessageError::InvalidField { field: "start_time", .. })
        ));
    }

    #[test]
    fn test_platform_recognition() {
        assert_eq!(Platform::from_name("EOS-Terra"), Some(Platform::Terra));
        assert_eq!(Platform::from_name("AQUA"), Some(Platform::Aqua));
        assert_eq!(Platform::from_name("NOAA-19"), Some(Platform::Aapp("noaa19".into())));
        assert_eq!(Platform::from_name("noaa15"), Some(Platform::Aapp("noaa15".into())));
        assert_eq!(Platform::from_name("Metop-B"), Some(Platform::Aapp("metop01".into())));
        assert_eq!(Platform::from_name("metop03"), Some(Platform::Aapp("metop03".into())));
        assert_eq!(Platform::from_name("Suomi-NPP"), None);
        assert_eq!(Platform::Aqua.family(), SceneFamily::Paired);
        assert_eq!(Platform::Terra.family(), SceneFamily::SingleFile);
    }
}
