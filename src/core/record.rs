// Point, page, and collection metadata types shared by the pager, sink, and matcher.
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Payloads are schema-less; values are the `serde_json::Value` sum type.
pub type Payload = Map<String, Value>;

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(id) => write!(f, "{id}"),
            PointId::Uuid(id) => f.write_str(id),
        }
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        PointId::Num(id)
    }
}

impl From<&str> for PointId {
    fn from(id: &str) -> Self {
        PointId::Uuid(id.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: PointId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Payload,
    /// Dense, named, or sparse vectors are carried through uninterpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Value>,
}

impl Record {
    pub fn new(id: impl Into<PointId>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
            vector: None,
        }
    }
}

/// Server-issued continuation token. Only ever compared to absence and echoed back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageOffset(Value);

impl PageOffset {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Page {
    #[serde(rename = "points")]
    pub records: Vec<Record>,
    #[serde(default, rename = "next_page_offset")]
    pub next_offset: Option<PageOffset>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScrollRequest {
    pub limit: usize,
    pub with_payload: bool,
    pub with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<PageOffset>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub vectors_count: Option<u64>,
    #[serde(default)]
    pub indexed_vectors_count: Option<u64>,
    #[serde(default)]
    pub points_count: Option<u64>,
    #[serde(default)]
    pub segments_count: u64,
}

impl CollectionInfo {
    pub fn points(&self) -> u64 {
        self.points_count.unwrap_or(0)
    }

    pub fn vectors(&self) -> u64 {
        self.vectors_count.unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub app: TelemetryApp,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TelemetryApp {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}
