//! "Price, Duration, Projects" シートの競合コース行の同期
//!
//! (Provider, Course Name) が一致する行を上書きし、なければ末尾に追加する。
//! 列はシート自身のヘッダー行から解決する。

use super::layout::{header_schema, FIRST_DATA_ROW};
use crate::error::{AppError, Result};
use crate::workbook::{CellValue, Sheet};
use competitor_iq_common::schema::{COURSE_NAME_COLUMN, PROVIDER_COLUMN, WEBSITE_LINK_COLUMN};
use competitor_iq_common::{ColumnSchema, FieldMap};
use serde::Serialize;
use tracing::{info, warn};

/// ヘッダーが見つからない場合の識別列（A / B / I）
const FALLBACK_PROVIDER_COLUMN: u32 = 1;
const FALLBACK_COURSE_NAME_COLUMN: u32 = 2;
const FALLBACK_WEBSITE_LINK_COLUMN: u32 = 9;

/// 行の識別情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompetitorIdentity {
    pub provider: String,
    pub course_name: String,
    pub website_link: String,
}

impl CompetitorIdentity {
    pub fn new(
        provider: impl Into<String>,
        course_name: impl Into<String>,
        website_link: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            course_name: course_name.into(),
            website_link: website_link.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSyncReport {
    pub row: u32,
    pub created: bool,
    pub fields_written: usize,
    /// ヘッダーに対応する列がなかったフィールド名
    pub unmapped_fields: Vec<String>,
}

/// 行同期を行うべきか（コース名・URL・フィールドのいずれかがある）
pub fn should_sync_row(identity: &CompetitorIdentity, fields: &FieldMap) -> bool {
    !identity.course_name.trim().is_empty()
        || !identity.website_link.trim().is_empty()
        || !fields.is_empty()
}

struct IdentityColumns {
    provider: u32,
    course_name: u32,
    website_link: u32,
}

impl IdentityColumns {
    fn resolve(schema: &ColumnSchema) -> Self {
        Self {
            provider: schema.column(PROVIDER_COLUMN).unwrap_or(FALLBACK_PROVIDER_COLUMN),
            course_name: schema
                .column(COURSE_NAME_COLUMN)
                .unwrap_or(FALLBACK_COURSE_NAME_COLUMN),
            website_link: schema
                .column(WEBSITE_LINK_COLUMN)
                .unwrap_or(FALLBACK_WEBSITE_LINK_COLUMN),
        }
    }
}

fn cell_matches(sheet: &Sheet, row: u32, col: u32, expected: &str) -> bool {
    sheet.trimmed_text(row, col).unwrap_or_default() == expected.trim()
}

/// (Provider, Course Name) が一致する行
fn find_row(sheet: &Sheet, columns: &IdentityColumns, identity: &CompetitorIdentity) -> Option<u32> {
    (FIRST_DATA_ROW..=sheet.max_row()).find(|&row| {
        cell_matches(sheet, row, columns.provider, &identity.provider)
            && cell_matches(sheet, row, columns.course_name, &identity.course_name)
    })
}

/// 値を書く（新規行は参照行のスタイルを先にコピー）
fn write_text(sheet: &mut Sheet, row: u32, col: u32, value: &str, reference_row: Option<u32>) {
    if let Some(reference) = reference_row {
        sheet.copy_style((reference, col), (row, col));
    }
    sheet.set_value(row, col, CellValue::Text(value.to_string()));
}

/// 競合コース行を作成または更新する
///
/// Provider が空の行はキーにできないのでエラー。
pub fn sync_competitor_row(
    sheet: &mut Sheet,
    identity: &CompetitorIdentity,
    fields: &FieldMap,
) -> Result<RowSyncReport> {
    if identity.provider.trim().is_empty() {
        return Err(AppError::Workbook(
            "Provider is required to sync a price row".to_string(),
        ));
    }

    let schema = header_schema(sheet);
    let columns = IdentityColumns::resolve(&schema);

    let (row, created) = match find_row(sheet, &columns, identity) {
        Some(row) => {
            info!("Updating existing row {} for '{}'", row, identity.provider);
            (row, false)
        }
        None => {
            let row = (sheet.max_row() + 1).max(FIRST_DATA_ROW);
            info!("Appending row {} for '{}'", row, identity.provider);
            (row, true)
        }
    };

    // 新規行は2行目を参照する（2行目自身を作る場合を除く）
    let reference_row = (created && row > FIRST_DATA_ROW).then_some(FIRST_DATA_ROW);
    if let Some(reference) = reference_row {
        if let Some(height) = sheet.row_height(reference) {
            sheet.set_row_height(row, height);
        }
    }

    write_text(sheet, row, columns.provider, identity.provider.trim(), reference_row);
    if !identity.course_name.trim().is_empty() {
        write_text(sheet, row, columns.course_name, identity.course_name.trim(), reference_row);
    }
    if !identity.website_link.trim().is_empty() {
        write_text(sheet, row, columns.website_link, identity.website_link.trim(), reference_row);
    }

    let mut fields_written = 0;
    let mut unmapped_fields = Vec::new();
    for (name, value) in fields.iter() {
        match schema.column(name) {
            Some(col) => {
                write_text(sheet, row, col, value, reference_row);
                fields_written += 1;
            }
            None => {
                warn!("Column '{}' not found in price sheet, skipped", name);
                unmapped_fields.push(name.to_string());
            }
        }
    }

    Ok(RowSyncReport {
        row,
        created,
        fields_written,
        unmapped_fields,
    })
}
