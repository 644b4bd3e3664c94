use crate::error::Result;
use crate::models::{District, ResultRecord};
use crate::store::UpsertKind;
use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound frames from observers and correspondents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "request:all")]
    RequestAll,
    /// The payload stays raw until the store has checked its shape.
    #[serde(rename = "submit")]
    Submit {
        #[serde(default)]
        payload: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage<'a> {
    #[serde(rename = "districts:all")]
    DistrictsAll(&'a [District]),
    #[serde(rename = "results:all")]
    ResultsAll(&'a [ResultRecord]),
    #[serde(rename = "result:new")]
    ResultNew(&'a ResultRecord),
    #[serde(rename = "result:updated")]
    ResultUpdated(&'a ResultRecord),
}

impl<'a> ServerMessage<'a> {
    pub fn delta(record: &'a ResultRecord, kind: UpsertKind) -> Self {
        match kind {
            UpsertKind::Created => ServerMessage::ResultNew(record),
            UpsertKind::Updated => ServerMessage::ResultUpdated(record),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::DistrictsAll(_) => "districts:all",
            ServerMessage::ResultsAll(_) => "results:all",
            ServerMessage::ResultNew(_) => "result:new",
            ServerMessage::ResultUpdated(_) => "result:updated",
        }
    }

    /// Serializes the message into a text frame. Broadcasts encode once and
    /// share the frame between connections.
    pub fn encode(&self) -> Result<Utf8Bytes> {
        Ok(Utf8Bytes::from(serde_json::to_string(self)?))
    }
}
