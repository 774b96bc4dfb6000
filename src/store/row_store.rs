use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{RowStoreError, RowStoreResult};
use crate::rows::{rows_from_json, Row, RowSet};

/// One page of rows plus the total row count of the table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowPage {
    pub rows: RowSet,
    pub total: usize,
}

impl RowPage {
    /// Slices `rows` into the requested 1-based page.
    pub fn paginate(rows: &[Row], page: usize, page_size: usize) -> Self {
        let start = page.saturating_sub(1).saturating_mul(page_size);
        Self {
            rows: rows.iter().skip(start).take(page_size).cloned().collect(),
            total: rows.len(),
        }
    }
}

/// Paginated table storage backing data source nodes.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Fetches one 1-based page of a table.
    async fn fetch_rows(
        &self,
        table_ref: &str,
        page: usize,
        page_size: usize,
    ) -> RowStoreResult<RowPage>;
}

/// Row store holding tables in memory. Used by tests and embedders.
#[derive(Default)]
pub struct InMemoryRowStore {
    tables: RwLock<HashMap<String, RowSet>>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_table(&self, table_ref: impl Into<String>, rows: RowSet) {
        self.tables.write().await.insert(table_ref.into(), rows);
    }

    pub async fn remove_table(&self, table_ref: &str) -> Option<RowSet> {
        self.tables.write().await.remove(table_ref)
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn fetch_rows(
        &self,
        table_ref: &str,
        page: usize,
        page_size: usize,
    ) -> RowStoreResult<RowPage> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table_ref)
            .ok_or_else(|| RowStoreError::TableNotFound(table_ref.to_string()))?;
        Ok(RowPage::paginate(rows, page, page_size))
    }
}

/// Row store reading tables from a directory: `<table>.json` holding an array
/// of objects, or `<table>.csv` with a header line.
pub struct DirRowStore {
    root: PathBuf,
}

impl DirRowStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, table_ref: &str) -> RowStoreResult<PathBuf> {
        // Table references are plain names; anything path-like is not a table.
        if table_ref.is_empty()
            || table_ref.contains(['/', '\\'])
            || table_ref.starts_with('.')
        {
            return Err(RowStoreError::TableNotFound(table_ref.to_string()));
        }
        ["json", "csv"]
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", table_ref, ext)))
            .find(|path| path.is_file())
            .ok_or_else(|| RowStoreError::TableNotFound(table_ref.to_string()))
    }

    async fn load(&self, table_ref: &str) -> RowStoreResult<RowSet> {
        let path = self.resolve(table_ref)?;
        debug!("Loading table {} from {}", table_ref, path.display());
        let contents = tokio::fs::read(&path).await?;

        if path.extension().is_some_and(|ext| ext == "csv") {
            parse_csv(&contents)
        } else {
            let value: Value = serde_json::from_slice(&contents)?;
            if !value.is_array() {
                return Err(RowStoreError::Backend(format!(
                    "{} does not contain a JSON array",
                    path.display()
                )));
            }
            Ok(rows_from_json(value))
        }
    }
}

#[async_trait]
impl RowStore for DirRowStore {
    async fn fetch_rows(
        &self,
        table_ref: &str,
        page: usize,
        page_size: usize,
    ) -> RowStoreResult<RowPage> {
        let rows = self.load(table_ref).await?;
        Ok(RowPage::paginate(&rows, page, page_size))
    }
}

fn parse_csv(contents: &[u8]) -> RowStoreResult<RowSet> {
    let mut reader = csv::Reader::from_reader(contents);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), csv_cell(cell));
        }
        rows.push(row);
    }

    Ok(rows)
}

fn csv_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::from(int);
    }
    match cell.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::String(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_store_paginates() {
        let store = InMemoryRowStore::new();
        let rows = rows_from_json(json!([{"n": 1}, {"n": 2}, {"n": 3}]));
        store.insert_table("numbers", rows).await;

        let page = store.fetch_rows("numbers", 2, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.rows, rows_from_json(json!([{"n": 3}])));

        let missing = store.fetch_rows("nope", 1, 10).await;
        assert!(matches!(missing, Err(RowStoreError::TableNotFound(_))));
    }

    #[tokio::test]
    async fn dir_store_reads_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("people.json"), r#"[{"name": "Ada"}, 4]"#).unwrap();
        std::fs::write(
            dir.path().join("scores.csv"),
            "name,score,ratio\nAda,10,0.5\nGrace,,n/a\n",
        )
        .unwrap();
        let store = DirRowStore::new(dir.path());

        let people = store.fetch_rows("people", 1, 100).await.unwrap();
        assert_eq!(people.rows, rows_from_json(json!([{"name": "Ada"}])));

        let scores = store.fetch_rows("scores", 1, 100).await.unwrap();
        assert_eq!(
            scores.rows,
            rows_from_json(json!([
                {"name": "Ada", "score": 10, "ratio": 0.5},
                {"name": "Grace", "score": null, "ratio": "n/a"},
            ]))
        );
    }

    #[tokio::test]
    async fn dir_store_rejects_path_like_refs() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirRowStore::new(dir.path());
        let result = store.fetch_rows("../etc/passwd", 1, 10).await;
        assert!(matches!(result, Err(RowStoreError::TableNotFound(_))));
    }
}
