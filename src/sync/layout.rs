//! マスタExcelの固定レイアウト
//!
//! - "Comparison": 1行目がヘッダー、B列がトピック、D列以降が競合コース
//! - "Price, Duration, Projects": 1行目がカラム名、2行目以降が競合コース

use crate::error::{AppError, Result};
use crate::workbook::{Sheet, Workbook};
use competitor_iq_common::{dedup_topics, ColumnSchema};
use tracing::warn;

pub const COMPARISON_SHEET: &str = "Comparison";
pub const PRICE_SHEET: &str = "Price, Duration, Projects";

pub const HEADER_ROW: u32 = 1;
pub const FIRST_DATA_ROW: u32 = 2;
/// トピック列（B）
pub const TOPIC_COLUMN: u32 = 2;
/// 競合コース列の開始（D）
pub const FIRST_COMPETITOR_COLUMN: u32 = 4;
/// 競合コース列がまだない場合のスタイル参照列（C）
pub const FALLBACK_REFERENCE_COLUMN: u32 = 3;

/// トピック範囲の終端マーカー
pub const TOPIC_END: &str = "TOPIC END";
/// 集計行の接頭辞（トピック一覧の生成時はここで止める）
const SUMMARY_PREFIXES: &[&str] = &["ESSENTIAL YES", "ESSENTIAL NO"];

pub fn is_topic_end(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(TOPIC_END)
}

fn is_summary_row(text: &str) -> bool {
    let upper = text.trim().to_ascii_uppercase();
    SUMMARY_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// トピック行を (行番号, トピック) で返す
///
/// "TOPIC END" で停止し、空セルは停止せずに読み飛ばす。
/// マーカーがなければ最終行まで読む。
pub fn topic_rows(sheet: &Sheet) -> Vec<(u32, String)> {
    let mut rows = Vec::new();
    for row in FIRST_DATA_ROW..=sheet.max_row() {
        let Some(topic) = sheet.trimmed_text(row, TOPIC_COLUMN) else {
            continue;
        };
        if is_topic_end(&topic) {
            return rows;
        }
        rows.push((row, topic));
    }

    warn!(
        "No '{}' row in sheet '{}'; reading topics down to row {}",
        TOPIC_END,
        sheet.name,
        sheet.max_row()
    );
    rows
}

pub fn comparison_sheet(workbook: &Workbook) -> Result<&Sheet> {
    workbook
        .sheet(COMPARISON_SHEET)
        .ok_or_else(|| AppError::MissingSheet(COMPARISON_SHEET.to_string()))
}

/// 正規トピック一覧（集計行で停止、重複除去、順序保持）
pub fn collect_topics(workbook: &Workbook) -> Result<Vec<String>> {
    let sheet = comparison_sheet(workbook)?;
    let topics = topic_rows(sheet)
        .into_iter()
        .map(|(_, topic)| topic)
        .take_while(|topic| !is_summary_row(topic));
    Ok(dedup_topics(topics))
}

/// シートのヘッダー行からスキーマを作る
pub fn header_schema(sheet: &Sheet) -> ColumnSchema {
    ColumnSchema::from_headers(sheet.row_values(HEADER_ROW))
}

/// 価格シートのカラムスキーマ
pub fn price_columns(workbook: &Workbook) -> Result<ColumnSchema> {
    workbook
        .sheet(PRICE_SHEET)
        .map(header_schema)
        .ok_or_else(|| AppError::MissingSheet(PRICE_SHEET.to_string()))
}
