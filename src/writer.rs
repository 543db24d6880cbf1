//! マスタExcelの更新
//!
//! 1回読み込み → 列同期 → 行同期 → 1回だけ書き出す。
//! 行同期の失敗は結果に含めて返し、列同期の変更は捨てない。
//! 保存先（バージョン付きファイル名）の決定と書き込みは呼び出し側。

use crate::error::Result;
use crate::sync::{
    should_sync_row, sync_competitor_column, sync_competitor_row, ColumnSyncReport,
    CompetitorIdentity, RowSyncReport, PRICE_SHEET,
};
use crate::workbook::{load_workbook, save_workbook, Workbook};
use competitor_iq_common::{DecisionMap, FieldMap};
use serde::Serialize;
use tracing::{info, warn};

/// 行同期の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RowOutcome {
    Synced(RowSyncReport),
    /// 行データなし、または価格シートなし
    Skipped { reason: String },
    Failed { error: String },
}

impl RowOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            RowOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// 行同期の入力
#[derive(Debug, Clone)]
pub struct RowUpdate {
    pub identity: CompetitorIdentity,
    pub fields: FieldMap,
}

/// 更新後のバイト列と同期結果
#[derive(Debug)]
pub struct DocumentUpdate {
    pub bytes: Vec<u8>,
    pub column: ColumnSyncReport,
    pub row: RowOutcome,
}

fn apply_row(workbook: &mut Workbook, update: Option<&RowUpdate>) -> Result<RowOutcome> {
    let Some(update) = update else {
        return Ok(RowOutcome::Skipped {
            reason: "no row data".to_string(),
        });
    };
    if !should_sync_row(&update.identity, &update.fields) {
        return Ok(RowOutcome::Skipped {
            reason: "no course name, link or fields".to_string(),
        });
    }
    let Some(sheet) = workbook.sheet_mut(PRICE_SHEET) else {
        warn!("Sheet '{}' not found, skipping row sync", PRICE_SHEET);
        return Ok(RowOutcome::Skipped {
            reason: format!("sheet '{}' not found", PRICE_SHEET),
        });
    };

    sync_competitor_row(sheet, &update.identity, &update.fields).map(RowOutcome::Synced)
}

/// 読み込み済みのワークブックに両方の同期を適用する
pub fn apply_updates(
    workbook: &mut Workbook,
    label: &str,
    decisions: &DecisionMap,
    row: Option<&RowUpdate>,
) -> Result<(ColumnSyncReport, RowOutcome)> {
    let column = sync_competitor_column(workbook, label, decisions)?;

    let row = match apply_row(workbook, row) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Row sync failed: {}", e);
            RowOutcome::Failed {
                error: e.to_string(),
            }
        }
    };

    Ok((column, row))
}

/// マスタExcelのバイト列を更新する
pub fn update_document(
    source: &[u8],
    label: &str,
    decisions: &DecisionMap,
    row: Option<&RowUpdate>,
) -> Result<DocumentUpdate> {
    let mut workbook = load_workbook(source)?;
    write_document(&mut workbook, label, decisions, row)
}

/// 読み込み済みのワークブックを更新し、1回だけ書き出す
pub fn write_document(
    workbook: &mut Workbook,
    label: &str,
    decisions: &DecisionMap,
    row: Option<&RowUpdate>,
) -> Result<DocumentUpdate> {
    let (column, row) = apply_updates(workbook, label, decisions, row)?;
    let bytes = save_workbook(workbook)?;

    info!(
        "Document updated: column {} ({}), {} bytes",
        column.column,
        if column.created { "created" } else { "updated" },
        bytes.len()
    );

    Ok(DocumentUpdate { bytes, column, row })
}
