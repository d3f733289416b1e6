//! Loading filter chains from the JSON filter file.
//!
//! # Format
//!
//! ```json
//! [
//!   { "filter_name": "logs", "filter_type": "regex", "field_name": "index",
//!     "filter_items": ["^logs-", "^audit-"] },
//!   { "filter_name": "big", "filter_type": "range", "field_name": "docs.count",
//!     "filter_items": [], "start": 10000 },
//!   { "filter_name": "emails", "filter_type": "regex_dict", "field_name": "user.email",
//!     "filter_items": ["@corp\\.example$"] }
//! ]
//! ```
//!
//! `regex`, `basic`, `range` and `date_range` narrow the collection list;
//! `regex_dict` narrows the exported records.
use super::{EntityFilter, FilterChain, RecordFilter};
use crate::error::{Error, Result};
use crate::service::CollectionSummary;
use serde_derive::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FilterEntry {
    filter_name: String,
    filter_type: String,
    field_name: String,
    #[serde(default)]
    filter_items: Vec<String>,
    #[serde(default)]
    start: Option<Value>,
    #[serde(default)]
    end: Option<Value>,
}

/// Both chains built from one filter file.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub collections: FilterChain<EntityFilter>,
    pub records: FilterChain<RecordFilter>,
}

impl FilterSet {
    /// Reads and validates the filter file. Any problem, including an
    /// unknown `filter_type`, is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let entries: Vec<FilterEntry> = serde_json::from_str(content)
            .map_err(|e| Error::config(format!("Invalid filter file: {e}")))?;

        let mut set = Self::default();
        for entry in entries {
            set.add(entry)?;
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.records.is_empty()
    }

    fn add(&mut self, entry: FilterEntry) -> Result<()> {
        let FilterEntry {
            filter_name: name,
            filter_type,
            field_name: field,
            filter_items: items,
            start,
            end,
        } = entry;

        if filter_type == "regex_dict" {
            let stage = if field.contains('.') {
                RecordFilter::nested_regex(&name, &field, &items)?
            } else {
                RecordFilter::regex(&name, &field, &items)?
            };
            self.records.push(stage);
            return Ok(());
        }

        let stage = match filter_type.as_str() {
            "regex" => EntityFilter::regex(&name, &field, &items)?,
            "basic" => EntityFilter::substring(&name, &field, &items),
            "range" => EntityFilter::numeric_range(
                &name,
                &field,
                number_bound(&name, start.as_ref())?,
                number_bound(&name, end.as_ref())?,
            ),
            "date_range" => EntityFilter::date_range(
                &name,
                &field,
                text_bound(&name, start.as_ref())?,
                text_bound(&name, end.as_ref())?,
            )?,
            other => {
                return Err(Error::config(format!(
                    "Unknown filter type '{other}' in filter '{name}'"
                )))
            }
        };

        if !CollectionSummary::has_attribute(&field) {
            return Err(Error::config(format!(
                "Filter '{name}' uses unknown collection attribute '{field}'"
            )));
        }
        self.collections.push(stage);
        Ok(())
    }
}

fn number_bound(name: &str, bound: Option<&Value>) -> Result<Option<f64>> {
    match bound {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("Invalid numeric bound '{s}' in filter '{name}'"))),
        Some(other) => Err(Error::config(format!(
            "Invalid numeric bound {other} in filter '{name}'"
        ))),
    }
}

fn text_bound<'a>(name: &str, bound: Option<&'a Value>) -> Result<Option<&'a str>> {
    match bound {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(Error::config(format!(
            "Invalid date bound {other} in filter '{name}'"
        ))),
    }
}
