use super::ExportFormat;
use crate::error::{Error, Result};
use crate::filter::Record;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Appends exported records to one destination file.
///
/// Pages are encoded in memory and written with a single call each, so a
/// failed export leaves every completed page on disk.
#[derive(Debug)]
pub struct RecordSink {
    path: PathBuf,
    format: ExportFormat,
    writer: BufWriter<File>,
    columns: Option<Vec<String>>,
    written: u64,
}

impl RecordSink {
    /// Creates (or truncates) `path`, along with any missing parent
    /// directories. With a projection the CSV header is written right away.
    pub async fn create(
        path: &Path,
        format: ExportFormat,
        projection: Option<&[String]>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(path).await.map_err(|e| Error::io(path, e))?;

        let mut sink = Self {
            path: path.to_path_buf(),
            format,
            writer: BufWriter::new(file),
            columns: None,
            written: 0,
        };
        if let Some(fields) = projection.filter(|p| !p.is_empty()) {
            sink.columns = Some(fields.to_vec());
            if format == ExportFormat::Csv {
                let header = sink.encode_csv_rows(&[fields.to_vec()])?;
                sink.write(&header).await?;
            }
        }
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Writes one page and returns how many records it held.
    pub async fn write_page(&mut self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let bytes = match self.format {
            ExportFormat::Csv => self.encode_csv(records)?,
            ExportFormat::Jsonl => self.encode_jsonl(records)?,
        };
        self.write(&bytes).await?;
        self.written += records.len() as u64;
        Ok(records.len())
    }

    /// Flushes buffered bytes to disk.
    pub async fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .await
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(self.written)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| Error::io(&self.path, e))
    }

    fn encode_csv(&mut self, records: &[Record]) -> Result<Vec<u8>> {
        let mut rows = Vec::with_capacity(records.len() + 1);
        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => {
                // The first record decides the columns for the whole file.
                let columns: Vec<String> = records[0].keys().cloned().collect();
                rows.push(columns.clone());
                self.columns = Some(columns.clone());
                columns
            }
        };

        rows.extend(records.iter().map(|record| {
            columns
                .iter()
                .map(|column| cell(record.get(column)))
                .collect::<Vec<_>>()
        }));
        self.encode_csv_rows(&rows)
    }

    fn encode_csv_rows(&self, rows: &[Vec<String>]) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| Error::io(&self.path, e.into_error()))
    }

    fn encode_jsonl(&self, records: &[Record]) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for record in records {
            match &self.columns {
                Some(columns) => serde_json::to_writer(&mut bytes, &project(record, columns))?,
                None => serde_json::to_writer(&mut bytes, record)?,
            }
            bytes.push(b'\n');
        }
        Ok(bytes)
    }
}

/// Keeps only the projected fields of `record`, in projection order.
pub fn project(record: &Record, fields: &[String]) -> Record {
    fields
        .iter()
        .filter_map(|field| record.get(field).map(|value| (field.clone(), value.clone())))
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn csv_header_follows_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.csv");
        let first: Record = serde_json::from_str(r#"{"zeta": 1, "alpha": "a", "mid": null}"#).unwrap();

        let mut sink = RecordSink::create(&path, ExportFormat::Csv, None).await.unwrap();
        sink.write_page(&[first]).await.unwrap();
        sink.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "zeta,alpha,mid\n1,a,\n");
    }

    #[tokio::test]
    async fn csv_header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/users.csv");

        let mut sink = RecordSink::create(&path, ExportFormat::Csv, None).await.unwrap();
        sink.write_page(&[record(json!({"name": "ann", "age": 31}))])
            .await
            .unwrap();
        sink.write_page(&[
            record(json!({"name": "bob, jr", "age": 40, "extra": true})),
            record(json!({"name": "cy"})),
        ])
        .await
        .unwrap();
        assert_eq!(sink.finish().await.unwrap(), 3);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        let header = lines.remove(0);
        assert_eq!(header, "name,age");
        assert_eq!(lines.len(), 3);
        assert!(!lines.iter().any(|l| l.contains("extra")));
        assert!(content.contains("\"bob, jr\""));
    }

    #[tokio::test]
    async fn projection_sets_header_and_drops_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let fields = vec!["email".to_owned(), "tags".to_owned()];

        let mut sink = RecordSink::create(&path, ExportFormat::Csv, Some(&fields))
            .await
            .unwrap();
        sink.write_page(&[record(
            json!({"email": "a@b.c", "password": "x", "tags": ["p", "q"]}),
        )])
        .await
        .unwrap();
        sink.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "email,tags\na@b.c,\"[\"\"p\"\",\"\"q\"\"]\"\n");
    }

    #[tokio::test]
    async fn projection_header_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let fields = vec!["a".to_owned()];

        let sink = RecordSink::create(&path, ExportFormat::Csv, Some(&fields))
            .await
            .unwrap();
        assert_eq!(sink.finish().await.unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\n");
    }

    #[tokio::test]
    async fn jsonl_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.jsonl");
        let fields = vec!["b".to_owned()];

        let mut sink = RecordSink::create(&path, ExportFormat::Jsonl, Some(&fields))
            .await
            .unwrap();
        sink.write_page(&[
            record(json!({"a": 1, "b": {"c": 2}})),
            record(json!({"a": 3})),
        ])
        .await
        .unwrap();
        sink.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"b\":{\"c\":2}}\n{}\n");
    }

    #[test]
    fn cells_render_scalars_plainly() {
        assert_eq!(cell(None), "");
        assert_eq!(cell(Some(&Value::Null)), "");
        assert_eq!(cell(Some(&json!("text"))), "text");
        assert_eq!(cell(Some(&json!(1.5))), "1.5");
        assert_eq!(cell(Some(&json!(false))), "false");
    }
}
