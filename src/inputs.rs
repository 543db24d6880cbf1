//! CLIが読み書きするファイル
//!
//! - トピック一覧JSON: 文字列の配列
//! - カラム一覧JSON: 文字列またはnullの配列
//! - 判定結果JSON: [{topic, decision, reasoning}]
//! - フィールドJSON: {カラム名: 値}
//! - 本文テキスト

use crate::error::{AppError, Result};
use competitor_iq_common::{
    collapse_whitespace, dedup_topics, parse_classification_response, parse_extraction_response,
    ColumnSchema, FieldMap, TopicRecord,
};
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// これより短い本文は抽出失敗の可能性が高い
const MIN_EVIDENCE_CHARS: usize = 50;

fn read_existing(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(AppError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// トピック一覧を読む（前後空白除去・空要素除外・重複除去）
pub fn read_topics(path: &Path) -> Result<Vec<String>> {
    let topics: Vec<String> = serde_json::from_str(&read_existing(path)?)?;
    Ok(dedup_topics(topics))
}

/// カラム一覧を読む
pub fn read_columns(path: &Path) -> Result<ColumnSchema> {
    let headers: Vec<Option<String>> = serde_json::from_str(&read_existing(path)?)?;
    Ok(ColumnSchema::from_headers(headers))
}

/// 判定結果を読む（```json ブロックも可）
pub fn read_decisions(path: &Path) -> Result<Vec<TopicRecord>> {
    Ok(parse_classification_response(&read_existing(path)?)?)
}

/// フィールドを読む（値が文字列以外でも可）
pub fn read_fields(path: &Path) -> Result<FieldMap> {
    Ok(parse_extraction_response(&read_existing(path)?)?)
}

/// 本文を読み、空白を詰める
pub fn read_evidence(path: &Path) -> Result<String> {
    let text = collapse_whitespace(&read_existing(path)?);
    if text.chars().count() < MIN_EVIDENCE_CHARS {
        warn!(
            "Extracted text is very short ({} chars): {}",
            text.chars().count(),
            path.display()
        );
    }
    Ok(text)
}

/// JSONを書き出す（パス省略時は標準出力）
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)?;
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_topics_dedups() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("topics.json");
        std::fs::write(&path, r#"["RAG", " RAG ", "", "Agents"]"#).unwrap();

        assert_eq!(read_topics(&path).unwrap(), vec!["RAG", "Agents"]);
    }

    #[test]
    fn test_read_columns_keeps_placeholders() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("columns.json");
        std::fs::write(&path, r#"["Provider", null, "Price"]"#).unwrap();

        let schema = read_columns(&path).unwrap();
        assert_eq!(schema.column("price"), Some(3));
        assert_eq!(schema.extraction_fields(), vec!["Price"]);
    }

    #[test]
    fn test_read_decisions_and_fields() {
        let dir = tempdir().expect("Failed to create temp dir");
        let decisions = dir.path().join("decisions.json");
        std::fs::write(
            &decisions,
            r#"[{"topic": "RAG", "decision": "Yes", "reasoning": "Week 3"}, {"topic": "Agents"}]"#,
        )
        .unwrap();
        let records = read_decisions(&decisions).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].decision, "No");

        let fields = dir.path().join("fields.json");
        std::fs::write(&fields, r#"{"Price": "$999", "Projects": 3}"#).unwrap();
        let fields = read_fields(&fields).unwrap();
        assert_eq!(fields.get("projects"), Some("3"));
    }

    #[test]
    fn test_read_evidence_collapses_whitespace() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("course.txt");
        std::fs::write(&path, "Module 1:\n\n  Prompt   Engineering\tbasics").unwrap();

        assert_eq!(read_evidence(&path).unwrap(), "Module 1: Prompt Engineering basics");
    }

    #[test]
    fn test_missing_input_file() {
        let result = read_topics(Path::new("/nonexistent/topics.json"));
        assert!(matches!(result, Err(AppError::FileNotFound(_))));
    }

    #[test]
    fn test_write_json_creates_parent() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("out").join("topics.json");
        write_json(&vec!["RAG"], Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("RAG"));
    }
}
