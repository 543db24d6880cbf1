//! Comparison シートの競合コース列の同期
//!
//! 同じラベルの列があれば上書き、なければ末尾に追加する。
//! 追加した列だけ参照列のスタイルと列幅を引き継ぐ。

use super::layout::{
    topic_rows, COMPARISON_SHEET, FALLBACK_REFERENCE_COLUMN, FIRST_COMPETITOR_COLUMN, HEADER_ROW,
};
use crate::error::{AppError, Result};
use crate::workbook::{CellValue, Note, Rgb, Sheet, Workbook};
use competitor_iq_common::{normalize_topic, DecisionMap, TopicVerdict};
use serde::Serialize;
use tracing::{debug, info};

/// メモの作成者
pub const NOTE_AUTHOR: &str = "AgenticAI";
/// シートにあるが判定マップにないトピックの理由
pub const NO_MENTION_FOUND: &str = "No mention found.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSyncReport {
    pub column: u32,
    pub created: bool,
    pub rows_written: usize,
    /// スタイルを引き継いだ列（新規作成時のみ）
    pub reference_column: Option<u32>,
}

/// 列ラベル: "{course} by {competitor}"（コース名なしは競合名のみ）
pub fn competitor_label(competitor: &str, course: Option<&str>) -> String {
    match course.map(str::trim).filter(|c| !c.is_empty()) {
        Some(course) => format!("{} by {}", course, competitor.trim()),
        None => competitor.trim().to_string(),
    }
}

/// 判定値ごとの (塗りつぶし色, 文字色)
pub fn decision_palette(decision: &str) -> Option<(Rgb, Rgb)> {
    match decision {
        "Yes" => Some((Rgb(0xC6EFCE), Rgb(0x006100))),
        "No" => Some((Rgb(0xFFC7CE), Rgb(0x9C0006))),
        "Unsure" | "Maybe" => Some((Rgb(0xFFEB9C), Rgb(0x9C5700))),
        _ => None,
    }
}

/// ヘッダー行でラベルと完全一致する列
pub fn find_column(sheet: &Sheet, label: &str) -> Option<u32> {
    (1..=sheet.max_col()).find(|&col| sheet.text(HEADER_ROW, col).as_deref() == Some(label))
}

/// 新しい列のスタイル参照元
///
/// 対象列より左で最も近い、ヘッダーのある競合コース列。なければC列。
pub fn reference_column(sheet: &Sheet, target: u32) -> u32 {
    (FIRST_COMPETITOR_COLUMN..target)
        .rev()
        .find(|&col| sheet.trimmed_text(HEADER_ROW, col).is_some())
        .unwrap_or(FALLBACK_REFERENCE_COLUMN)
}

/// 判定マップの引き当て（完全一致 → 正規化一致）
fn lookup<'a>(decisions: &'a DecisionMap, topic: &str) -> Option<&'a TopicVerdict> {
    decisions.get(topic).or_else(|| {
        let key = normalize_topic(topic);
        decisions
            .iter()
            .find(|(t, _)| normalize_topic(t) == key)
            .map(|(_, v)| v)
    })
}

/// 判定値・色・メモを1セルに書く
fn write_decision(sheet: &mut Sheet, row: u32, col: u32, decision: &str, reasoning: &str) {
    let cell = sheet.cell_mut(row, col);
    cell.value = CellValue::Text(decision.to_string());

    if let Some((fill, font)) = decision_palette(decision) {
        cell.style.fill.color = Some(fill);
        cell.style.font.color = Some(font);
    }

    cell.note = if reasoning.trim().is_empty() {
        None
    } else {
        Some(Note {
            author: NOTE_AUTHOR.to_string(),
            text: reasoning.to_string(),
        })
    };
}

/// 競合コース列を作成または更新する
pub fn sync_competitor_column(
    workbook: &mut Workbook,
    label: &str,
    decisions: &DecisionMap,
) -> Result<ColumnSyncReport> {
    let sheet = workbook
        .sheet_mut(COMPARISON_SHEET)
        .ok_or_else(|| AppError::MissingSheet(COMPARISON_SHEET.to_string()))?;

    let (column, created) = match find_column(sheet, label) {
        Some(col) => (col, false),
        None => ((sheet.max_col() + 1).max(FIRST_COMPETITOR_COLUMN), true),
    };

    let reference = created.then(|| reference_column(sheet, column));
    let topics = topic_rows(sheet);

    if let Some(reference) = reference {
        info!("Creating column {} for '{}' (style from column {})", column, label, reference);
        sheet.copy_style((HEADER_ROW, reference), (HEADER_ROW, column));
        for (row, _) in &topics {
            sheet.copy_style((*row, reference), (*row, column));
        }
        if let Some(width) = sheet.col_width(reference) {
            sheet.set_col_width(column, width);
        }
    } else {
        info!("Updating existing column {} for '{}'", column, label);
    }

    sheet.set_value(HEADER_ROW, column, CellValue::Text(label.to_string()));

    for (row, topic) in &topics {
        match lookup(decisions, topic) {
            Some(verdict) => {
                write_decision(sheet, *row, column, verdict.decision.as_str(), &verdict.reasoning)
            }
            None => {
                debug!("Topic '{}' not in decisions, writing No", topic);
                write_decision(sheet, *row, column, "No", NO_MENTION_FOUND);
            }
        }
    }

    Ok(ColumnSyncReport {
        column,
        created,
        rows_written: topics.len(),
        reference_column: reference,
    })
}
