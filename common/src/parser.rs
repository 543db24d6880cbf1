//! AIレスポンスパーサー
//!
//! モデルのレスポンスからJSONを抽出し、
//! トピック判定（配列）と価格・期間抽出（オブジェクト）をパースする

use crate::error::{Error, Result};
use crate::types::{value_to_string, FieldMap, TopicRecord};

/// ```json ... ``` ブロックの中身を取り出す
fn fenced_block(response: &str) -> Option<&str> {
    let start_marker = response.find("```json")?;
    let start = start_marker + 7; // "```json" の長さ
    let end_offset = response[start..].find("```")?;
    Some(response[start..start + end_offset].trim())
}

/// 開き・閉じ文字で囲まれた最大範囲を取り出す
fn delimited(response: &str, open: char, close: char) -> Option<&str> {
    let start = response.find(open)?;
    let end = response.rfind(close)?;
    (end >= start).then(|| &response[start..=end])
}

/// APIレスポンスからJSON配列部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の [...] 配列
/// 3. エラー
///
/// # Examples
/// ```
/// use competitor_iq_common::extract_json;
///
/// let response = "Result: [{\"topic\": \"RAG\"}]";
/// let json = extract_json(response).unwrap();
/// assert!(json.starts_with('['));
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    if let Some(block) = fenced_block(response) {
        return Ok(block);
    }
    delimited(response, '[', ']').ok_or_else(|| Error::Parse("JSONが見つかりません".into()))
}

/// APIレスポンスからJSONオブジェクト部分を抽出
///
/// ```json ブロック、次に生の {...} の順で探す
pub fn extract_json_object(response: &str) -> Result<&str> {
    if let Some(block) = fenced_block(response) {
        return Ok(block);
    }
    delimited(response, '{', '}')
        .ok_or_else(|| Error::Parse("JSONオブジェクトが見つかりません".into()))
}

/// トピック判定レスポンスをパース
///
/// # Arguments
/// * `response` - モデルのレスポンス本文
///
/// # Returns
/// * `Ok(Vec<TopicRecord>)` - パース成功
/// * `Err` - JSONが見つからないか配列でない
pub fn parse_classification_response(response: &str) -> Result<Vec<TopicRecord>> {
    let json_str = extract_json(response)?;
    let records: Vec<TopicRecord> = serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("判定JSONパースエラー: {}", e)))?;
    Ok(records)
}

/// 価格・期間抽出レスポンスをパース
///
/// 値が文字列以外（数値・真偽値・配列）の場合は文字列化する。
///
/// # Returns
/// * `Ok(FieldMap)` - カラム名 → 値
/// * `Err` - JSONが見つからないかオブジェクトでない
pub fn parse_extraction_response(response: &str) -> Result<FieldMap> {
    let json_str = extract_json_object(response)?;
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("抽出JSONパースエラー: {}", e)))?;

    Ok(object
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect())
}
