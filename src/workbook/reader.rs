//! xlsx 読み込み
//!
//! 値と数式は calamine、スタイル・列幅・行高・結合・メモはZIP内のXMLから読む。
//! 元のバイト列は差分書き戻し用にブックに持たせる。

use super::model::{CellValue, Sheet, Workbook};
use super::ooxml::{
    comments_path, parse_comments_xml, parse_sheet_layout, parse_styles_xml, read_zip_file,
    rels_path_for, worksheet_paths, StyleSheet,
};
use super::package::SourcePackage;
use crate::error::{AppError, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use zip::ZipArchive;

/// ファイルからワークブックを読み込む
pub fn load_workbook_file(path: &Path) -> Result<Workbook> {
    if !path.exists() {
        return Err(AppError::FileNotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    load_workbook(&bytes)
}

/// xlsx のバイト列からワークブックを読み込む
pub fn load_workbook(bytes: &[u8]) -> Result<Workbook> {
    let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::Workbook(format!("Failed to open workbook: {}", e)))?;

    let mut workbook = Workbook::default();
    for name in xlsx.sheet_names() {
        let mut sheet = Sheet::new(name.clone());
        read_values(&mut xlsx, &name, &mut sheet)?;
        workbook.sheets.push(sheet);
    }

    apply_package_parts(bytes, &mut workbook)?;
    Ok(workbook)
}

fn data_to_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn read_values(xlsx: &mut Xlsx<Cursor<&[u8]>>, name: &str, sheet: &mut Sheet) -> Result<()> {
    let range = xlsx
        .worksheet_range(name)
        .map_err(|e| AppError::Workbook(format!("Failed to read sheet '{}': {}", name, e)))?;

    // データはA1から始まるとは限らない
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    for (row_idx, row) in range.rows().enumerate() {
        for (col_idx, data) in row.iter().enumerate() {
            let value = data_to_value(data);
            if value != CellValue::Empty {
                sheet.set_value(
                    start_row + row_idx as u32 + 1,
                    start_col + col_idx as u32 + 1,
                    value,
                );
            }
        }
    }

    // 数式は書き戻すために保持する（結果はキャッシュ値として残す）
    match xlsx.worksheet_formula(name) {
        Ok(formulas) => {
            let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
            for (row_idx, row) in formulas.rows().enumerate() {
                for (col_idx, formula) in row.iter().enumerate() {
                    if formula.is_empty() {
                        continue;
                    }
                    let (r, c) = (start_row + row_idx as u32 + 1, start_col + col_idx as u32 + 1);
                    let cached = sheet.text(r, c);
                    sheet.set_value(
                        r,
                        c,
                        CellValue::Formula {
                            formula: formula.trim_start_matches('=').to_string(),
                            cached,
                        },
                    );
                }
            }
        }
        Err(e) => debug!("Formulas unavailable for '{}': {}", name, e),
    }

    Ok(())
}

/// XML上の列幅（余白込み）→ 文字数単位の列幅
///
/// set_column_width は余白（5px / 最大桁幅7px）を足して書き出すので、その分を戻す。
fn character_width(file_width: f64) -> f64 {
    let chars = (file_width * 7.0 - 5.0) / 7.0;
    (chars.max(0.0) * 100.0).round() / 100.0
}

/// スタイル・レイアウト・メモを各シートに重ねる
fn apply_package_parts(bytes: &[u8], workbook: &mut Workbook) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Workbook(format!("Invalid xlsx archive: {}", e)))?;

    let styles: StyleSheet = match read_zip_file(&mut archive, "xl/styles.xml") {
        Ok(xml) => parse_styles_xml(&xml),
        Err(e) => {
            warn!("{}", e);
            StyleSheet::default()
        }
    };

    let workbook_xml = read_zip_file(&mut archive, "xl/workbook.xml").map_err(AppError::Workbook)?;
    let rels_xml =
        read_zip_file(&mut archive, "xl/_rels/workbook.xml.rels").map_err(AppError::Workbook)?;
    let paths = worksheet_paths(&workbook_xml, &rels_xml);

    for sheet in &mut workbook.sheets {
        let Some(path) = paths.get(&sheet.name) else {
            warn!("Worksheet part not found for '{}'", sheet.name);
            continue;
        };

        let xml = read_zip_file(&mut archive, path).map_err(AppError::Workbook)?;
        let layout = parse_sheet_layout(&xml);
        for (row, col, style_id) in layout.cell_styles {
            if let Some(style) = styles.styles.get(style_id) {
                let cell = sheet.cell_mut(row, col);
                cell.style = style.clone();
                cell.style_id = Some(style_id as u32);
            }
        }
        for (col, width) in layout.col_widths {
            sheet.set_col_width(col, character_width(width));
        }
        for (row, height) in layout.row_heights {
            sheet.set_row_height(row, height);
        }
        for range in layout.merges {
            sheet.add_merge(range);
        }

        // メモ（シートのリレーションにcommentsがある場合のみ）
        let comments = read_zip_file(&mut archive, &rels_path_for(path))
            .ok()
            .and_then(|rels| comments_path(path, &rels));
        if let Some(comments) = comments {
            let xml = read_zip_file(&mut archive, &comments).map_err(AppError::Workbook)?;
            for (row, col, note) in parse_comments_xml(&xml) {
                sheet.cell_mut(row, col).note = Some(note);
            }
        }

        debug!(
            "Loaded sheet '{}': {} rows x {} cols, {} merges",
            sheet.name,
            sheet.max_row(),
            sheet.max_col(),
            sheet.merges().len()
        );
    }

    // ここから先の編集は差分として記録する
    for sheet in &mut workbook.sheets {
        sheet.track_edits();
    }
    workbook.source = Some(Arc::new(SourcePackage {
        bytes: bytes.to_vec(),
        styles,
        sheet_paths: paths,
    }));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_width() {
        // set_column_width(32.0) は 32.7109375 として書き出される
        assert_eq!(character_width(32.7109375), 32.0);
        assert_eq!(character_width(9.140625), 8.43);
        assert_eq!(character_width(0.0), 0.0);
    }

    #[test]
    fn test_missing_file() {
        let err = load_workbook_file(Path::new("/nonexistent/master.xlsx")).unwrap_err();
        assert!(matches!(err, AppError::FileNotFound(_)));
    }
}
