//! Drives the public export API with a page source defined outside the
//! crate, the way an alternative backend would plug in.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use elastichunt::error::{Error, Result};
use elastichunt::export::{
    ExportCursor, ExportFormat, ExportJob, Exporter, Page, PageSource, RetryPolicy,
};
use elastichunt::filter::{FilterSet, Record};
use serde_json::{json, Value};

struct ScriptedSource {
    pages: RefCell<VecDeque<Result<Page>>>,
    tokens_seen: RefCell<Vec<String>>,
}

impl ScriptedSource {
    fn new(pages: Vec<Result<Page>>) -> Self {
        Self {
            pages: RefCell::new(pages.into()),
            tokens_seen: RefCell::new(Vec::new()),
        }
    }

    fn pop(&self) -> Result<Page> {
        self.pages
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}

impl PageSource for ScriptedSource {
    async fn open(&self, _collection: &str, _page_size: usize) -> Result<Page> {
        self.pop()
    }

    async fn next(&self, cursor: &ExportCursor) -> Result<Page> {
        self.tokens_seen.borrow_mut().push(cursor.token.clone());
        self.pop()
    }

    async fn close(&self, _cursor: &ExportCursor) -> Result<()> {
        Ok(())
    }
}

fn records(values: &[Value]) -> Vec<Record> {
    values
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

fn page(token: &str, values: &[Value]) -> Page {
    Page {
        token: Some(token.to_owned()),
        records: records(values),
        total: Some(4),
    }
}

#[tokio::test]
async fn filtered_jsonl_export_follows_rotating_tokens() {
    let filters = FilterSet::from_json(
        &json!([{
            "filter_name": "corp mail",
            "filter_type": "regex_dict",
            "field_name": "user.email",
            "filter_items": ["@corp\\.example$"]
        }])
        .to_string(),
    )
    .unwrap();

    let source = ScriptedSource::new(vec![
        Ok(page(
            "t1",
            &[
                json!({"user": {"email": "ann@corp.example"}, "n": 1}),
                json!({"user": {"email": "bob@home.example"}, "n": 2}),
            ],
        )),
        Err(Error::Response {
            url: "scripted".to_owned(),
            reason: "hiccup".to_owned(),
        }),
        Ok(page(
            "t2",
            &[
                json!({"user": {"email": "cy@corp.example"}, "n": 3}),
                json!({"user": "flat", "n": 4}),
            ],
        )),
    ]);

    let exporter = Exporter::new(source)
        .with_retry(RetryPolicy::fixed(2, Duration::from_millis(1)))
        .with_record_filters(filters.records);
    let dir = tempfile::tempdir().unwrap();
    let job = ExportJob::new("people", dir.path(), Some("corp"), ExportFormat::Jsonl);

    let report = exporter.export(&job).await.unwrap();

    assert_eq!(report.exported, 2);
    assert_eq!(report.total, Some(4));
    assert_eq!(job.destination, dir.path().join("corp").join("people.jsonl"));

    let numbers: Vec<i64> = std::fs::read_to_string(&job.destination)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, [1, 3]);
    assert_eq!(
        *exporter.source().tokens_seen.borrow(),
        ["t1", "t1", "t2"]
    );
}

#[tokio::test]
async fn failed_open_creates_no_file() {
    let source = ScriptedSource::new(vec![Err(Error::Response {
        url: "scripted".to_owned(),
        reason: "index_not_found_exception".to_owned(),
    })]);
    let exporter = Exporter::new(source);
    let dir = tempfile::tempdir().unwrap();
    let job = ExportJob::new("missing", dir.path(), None, ExportFormat::Csv);

    assert!(exporter.export(&job).await.is_err());
    assert!(!job.destination.exists());
}
