// src/ruletest/options.rs

use serde::{Deserialize, Serialize};

use crate::types::{TestFormat, TestType};

/// Options for one rule test, as accepted from callers.
///
/// Deserializes from the camelCase JSON shape clients send, e.g.
/// `{"days": 3, "format": "json", "maxResults": 10, "alert": false,
/// "testType": "schemaOnly"}`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestOptions {
    /// Number of days of data to run the rule against.
    pub days: Option<u32>,
    pub format: TestFormat,
    /// Maximum number of documents to query; `0` means unbounded.
    pub max_results: u64,
    /// Whether the engine should actually fire alerts.
    pub alert: bool,
    pub test_type: TestType,
}

impl TestOptions {
    /// Engine CLI flags for these options, in a stable order.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(days) = self.days {
            args.push("--days".to_string());
            args.push(days.to_string());
        }
        if self.format == TestFormat::Json {
            args.push("--formatted-output".to_string());
        }
        if self.max_results > 0 {
            args.push("--max-query-size".to_string());
            args.push(self.max_results.to_string());
        }
        if self.alert {
            args.push("--alert".to_string());
        }
        match self.test_type {
            TestType::SchemaOnly => args.push("--schema-only".to_string()),
            TestType::CountOnly => args.push("--count-only".to_string()),
            TestType::Full => {}
        }

        args
    }
}
