//! Filter chains that narrow collection listings and exported records.
//!
//! A [`FilterChain`] is an ordered list of stages. Inside a stage an item is
//! kept if it matches *any* of the stage's terms; across the chain an item
//! is kept only if every stage keeps it, each stage seeing just the
//! survivors of the previous one. An empty chain keeps everything.
//!
//! ```rust
//! # use elastichunt::filter::{EntityFilter, FilterChain};
//! # use elastichunt::service::CollectionSummary;
//! let mut chain = FilterChain::new();
//! chain.push(EntityFilter::regex("logs only", "name", &["^logs-"]).unwrap());
//!
//! let logs = CollectionSummary { name: "logs-2024".into(), ..Default::default() };
//! let users = CollectionSummary { name: "users".into(), ..Default::default() };
//! let kept = chain.apply(vec![logs, users]).unwrap();
//! assert_eq!(kept.len(), 1);
//! ```
mod config;

pub use config::FilterSet;

use crate::error::{Error, Result};
use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Format of dates compared by [`EntityFilter::DateRange`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One exported document: top-level field name to value.
pub type Record = Map<String, Value>;

/// Named, string-valued attributes of a structured item.
pub trait Attributes {
    fn attribute(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// A single predicate stage over items of type `T`.
pub trait Stage<T> {
    fn name(&self) -> &str;

    /// Whether `item` survives this stage. An error aborts the whole chain.
    fn matches(&self, item: &T) -> Result<bool>;
}

fn compile(patterns: &[impl AsRef<str>], case_insensitive: bool) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern.as_ref())
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| Error::config(format!("Invalid pattern '{}': {e}", pattern.as_ref())))
        })
        .collect()
}

/// Stages over [`Attributes`] items such as collection summaries.
#[derive(Debug, Clone)]
pub enum EntityFilter {
    Substring {
        name: String,
        field: String,
        items: Vec<String>,
    },
    /// Case-insensitive regular expressions.
    Regex {
        name: String,
        field: String,
        patterns: Vec<Regex>,
    },
    /// Inclusive numeric bounds; either may be open.
    NumericRange {
        name: String,
        field: String,
        start: Option<f64>,
        end: Option<f64>,
    },
    /// Inclusive `YYYY-MM-DD` bounds; either may be open.
    DateRange {
        name: String,
        field: String,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl EntityFilter {
    pub fn substring(name: &str, field: &str, items: &[impl AsRef<str>]) -> Self {
        Self::Substring {
            name: name.to_owned(),
            field: field.to_owned(),
            items: items.iter().map(|i| i.as_ref().to_owned()).collect(),
        }
    }

    pub fn regex(name: &str, field: &str, patterns: &[impl AsRef<str>]) -> Result<Self> {
        Ok(Self::Regex {
            name: name.to_owned(),
            field: field.to_owned(),
            patterns: compile(patterns, true)?,
        })
    }

    pub fn numeric_range(name: &str, field: &str, start: Option<f64>, end: Option<f64>) -> Self {
        Self::NumericRange {
            name: name.to_owned(),
            field: field.to_owned(),
            start,
            end,
        }
    }

    pub fn date_range(name: &str, field: &str, start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let parse = |bound: Option<&str>| {
            bound
                .map(|b| {
                    NaiveDate::parse_from_str(b, DATE_FORMAT).map_err(|e| {
                        Error::config(format!("Invalid date bound '{b}' in filter '{name}': {e}"))
                    })
                })
                .transpose()
        };
        Ok(Self::DateRange {
            name: name.to_owned(),
            field: field.to_owned(),
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// The attribute this stage reads.
    pub fn field(&self) -> &str {
        match self {
            Self::Substring { field, .. }
            | Self::Regex { field, .. }
            | Self::NumericRange { field, .. }
            | Self::DateRange { field, .. } => field,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Substring { name, .. }
            | Self::Regex { name, .. }
            | Self::NumericRange { name, .. }
            | Self::DateRange { name, .. } => name,
        }
    }

    fn failure(&self, reason: String) -> Error {
        Error::Filter {
            stage: self.name().to_owned(),
            reason,
        }
    }
}

fn within<T: PartialOrd>(value: &T, start: Option<&T>, end: Option<&T>) -> bool {
    start.map_or(true, |start| value >= start) && end.map_or(true, |end| value <= end)
}

impl<T: Attributes> Stage<T> for EntityFilter {
    fn name(&self) -> &str {
        EntityFilter::name(self)
    }

    fn matches(&self, item: &T) -> Result<bool> {
        let Some(value) = item.attribute(self.field()) else {
            return Ok(false);
        };

        match self {
            Self::Substring { items, .. } => Ok(items.iter().any(|i| value.contains(i.as_str()))),
            Self::Regex { patterns, .. } => Ok(patterns.iter().any(|p| p.is_match(&value))),
            Self::NumericRange { start, end, .. } => {
                let value = value.trim();
                if value.is_empty() {
                    return Ok(false);
                }
                let number: f64 = value
                    .parse()
                    .map_err(|_| self.failure(format!("'{value}' is not a number")))?;
                Ok(within(&number, start.as_ref(), end.as_ref()))
            }
            Self::DateRange { start, end, .. } => {
                let date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
                    self.failure(format!("'{value}' is not a {DATE_FORMAT} date: {e}"))
                })?;
                Ok(within(&date, start.as_ref(), end.as_ref()))
            }
        }
    }
}

/// Stages over raw exported records.
#[derive(Debug, Clone)]
pub enum RecordFilter {
    /// Regular expressions against a top-level key.
    Regex {
        name: String,
        key: String,
        patterns: Vec<Regex>,
    },
    /// Regular expressions against a value reached by a dotted path.
    NestedRegex {
        name: String,
        path: Vec<String>,
        patterns: Vec<Regex>,
    },
}

impl RecordFilter {
    pub fn regex(name: &str, key: &str, patterns: &[impl AsRef<str>]) -> Result<Self> {
        Ok(Self::Regex {
            name: name.to_owned(),
            key: key.to_owned(),
            patterns: compile(patterns, false)?,
        })
    }

    /// `path` is split on dots, e.g. `user.address.city`.
    pub fn nested_regex(name: &str, path: &str, patterns: &[impl AsRef<str>]) -> Result<Self> {
        Ok(Self::NestedRegex {
            name: name.to_owned(),
            path: path.split('.').map(str::to_owned).collect(),
            patterns: compile(patterns, false)?,
        })
    }

    fn patterns(&self) -> &[Regex] {
        match self {
            Self::Regex { patterns, .. } | Self::NestedRegex { patterns, .. } => patterns,
        }
    }
}

/// Follows `path` through nested objects. Anything that is not an object
/// along the way ends the walk with `None`.
pub fn nested_value<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(record.get(first)?, |value, key| value.as_object()?.get(key))
}

fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) if !s.is_empty() => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

impl Stage<Record> for RecordFilter {
    fn name(&self) -> &str {
        match self {
            Self::Regex { name, .. } | Self::NestedRegex { name, .. } => name,
        }
    }

    fn matches(&self, record: &Record) -> Result<bool> {
        let value = match self {
            Self::Regex { key, .. } => record.get(key),
            Self::NestedRegex { path, .. } => nested_value(record, path),
        };
        let Some(text) = value.and_then(scalar_text) else {
            return Ok(false);
        };
        Ok(self.patterns().iter().any(|p| p.is_match(&text)))
    }
}

/// Ordered stages applied left to right.
#[derive(Debug, Clone)]
pub struct FilterChain<F> {
    stages: Vec<F>,
}

impl<F> Default for FilterChain<F> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<F> FilterChain<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: F) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[F] {
        &self.stages
    }

    /// Keeps the items every stage accepts, preserving their order.
    pub fn apply<T>(&self, items: Vec<T>) -> Result<Vec<T>>
    where
        F: Stage<T>,
    {
        let mut items = items;
        for stage in &self.stages {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if stage.matches(&item)? {
                    kept.push(item);
                }
            }
            log::debug!("Filter '{}' kept {} item(s)", stage.name(), kept.len());
            items = kept;
        }
        Ok(items)
    }
}

impl<F> FromIterator<F> for FilterChain<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}
