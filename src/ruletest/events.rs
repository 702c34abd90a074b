// src/ruletest/events.rs

use serde::{Deserialize, Serialize};

use crate::types::TestFormat;

/// Message pushed to a live subscriber of a rule test.
///
/// Serialized adjacently tagged:
/// - `{"event":"result","data":"<stdout chunk>"}`
/// - `{"event":"progress","data":"<stderr chunk>"}`
/// - `{"event":"exit","data":{"code":0,"success":true}}` (always last)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Result(String),
    Progress(String),
    Exit(ExitReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    pub code: i32,
    pub success: bool,
}

impl StreamEvent {
    pub fn exit(code: i32) -> Self {
        StreamEvent::Exit(ExitReport {
            code,
            success: code == 0,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Join captured stdout chunks the way callers expect them for `format`.
///
/// JSON output is split arbitrarily by the pipe, so chunks are concatenated
/// as-is; text output is newline-joined.
pub fn join_output(chunks: &[String], format: TestFormat) -> String {
    match format {
        TestFormat::Json => chunks.concat(),
        TestFormat::Text => chunks.join("\n"),
    }
}
