//! ワークシートXMLの差分書き換え
//!
//! 変更したセル・列幅・行高・結合・コメント描画の参照だけを書き換え、
//! ウィンドウ枠、ハイパーリンク、条件付き書式、入力規則などの要素は元のまま残す。

use super::model::MergeRange;
use super::ooxml::{attr_parse, attr_string, cell_ref, parse_cell_ref, start_tag};
use crate::error::{AppError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

/// CT_Worksheet の子要素の並び順
const WORKSHEET_ORDER: [&str; 39] = [
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

fn order_of(name: &[u8]) -> Option<usize> {
    WORKSHEET_ORDER.iter().position(|n| n.as_bytes() == name)
}

fn order(name: &str) -> usize {
    order_of(name.as_bytes()).unwrap_or(WORKSHEET_ORDER.len())
}

/// 1シート分の書き換え内容
#[derive(Debug, Default)]
pub(crate) struct SheetPatch {
    /// (行, 列) → 新しい `<c>` 要素。None はセルを消す
    pub cells: BTreeMap<(u32, u32), Option<String>>,
    pub row_heights: BTreeMap<u32, f64>,
    /// 列 → XML上の列幅（余白込み）
    pub col_widths: BTreeMap<u32, f64>,
    pub dimension: Option<String>,
    /// Some なら mergeCells を丸ごと置き換える
    pub merges: Option<Vec<MergeRange>>,
    /// 追加したコメント描画（VML）の r:id
    pub legacy_drawing: Option<String>,
}

impl SheetPatch {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
            && self.row_heights.is_empty()
            && self.col_widths.is_empty()
            && self.merges.is_none()
            && self.legacy_drawing.is_none()
    }
}

#[derive(Debug, Default)]
struct RowEdit {
    cells: BTreeMap<u32, Option<String>>,
    height: Option<f64>,
}

fn height_attrs(height: Option<f64>) -> Vec<(&'static str, String)> {
    match height {
        Some(h) => vec![("ht", h.to_string()), ("customHeight", "1".to_string())],
        None => Vec::new(),
    }
}

/// 元のXMLにない行
fn new_row_xml(row: u32, edit: &RowEdit) -> String {
    let cells: String = edit.cells.values().flatten().map(String::as_str).collect();
    let height: String = height_attrs(edit.height)
        .iter()
        .map(|(k, v)| format!(" {}=\"{}\"", k, v))
        .collect();
    match (cells.is_empty(), height.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("<row r=\"{}\"{}/>", row, height),
        _ => format!("<row r=\"{}\"{}>{}</row>", row, height, cells),
    }
}

fn col_xml(col: u32, width: f64) -> String {
    format!("<col min=\"{0}\" max=\"{0}\" width=\"{1}\" customWidth=\"1\"/>", col, width)
}

fn merge_cells_xml(merges: &[MergeRange]) -> String {
    if merges.is_empty() {
        return String::new();
    }
    let cells: String = merges
        .iter()
        .map(|m| {
            format!(
                "<mergeCell ref=\"{}:{}\"/>",
                cell_ref(m.first_row, m.first_col),
                cell_ref(m.last_row, m.last_col)
            )
        })
        .collect();
    format!("<mergeCells count=\"{}\">{}</mergeCells>", merges.len(), cells)
}

/// 挿入待ちのうち `before` より前に並ぶものを書き出す
fn flush_pending(pending: &mut BTreeMap<usize, String>, before: usize, out: &mut String) {
    while let Some(entry) = pending.first_entry() {
        if *entry.key() >= before {
            break;
        }
        out.push_str(&entry.remove());
    }
}

/// 指定列より前にある新しいセルを書き出す
fn flush_cells(cells: &mut BTreeMap<u32, Option<String>>, before: u32, out: &mut String) {
    while let Some(entry) = cells.first_entry() {
        if *entry.key() >= before {
            break;
        }
        if let Some(xml) = entry.remove() {
            out.push_str(&xml);
        }
    }
}

fn flush_rows(rows: &mut BTreeMap<u32, RowEdit>, before: u32, out: &mut String) {
    while let Some(entry) = rows.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let row = *entry.key();
        out.push_str(&new_row_xml(row, &entry.remove()));
    }
}

fn flush_cols(cols: &mut BTreeMap<u32, f64>, before: u32, out: &mut String) {
    while let Some(entry) = cols.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let col = *entry.key();
        out.push_str(&col_xml(col, entry.remove()));
    }
}

/// ワークシートXMLに変更を当てる
pub(crate) fn patch_worksheet(xml: &str, patch: &SheetPatch) -> Result<String> {
    let mut rows: BTreeMap<u32, RowEdit> = BTreeMap::new();
    for (&(row, col), cell) in &patch.cells {
        rows.entry(row).or_default().cells.insert(col, cell.clone());
    }
    for (&row, &height) in &patch.row_heights {
        rows.entry(row).or_default().height = Some(height);
    }
    let mut cols = patch.col_widths.clone();
    let merges = patch.merges.as_deref().map(merge_cells_xml);

    // 元のXMLにない要素は、後ろに並ぶ要素の直前（なければ末尾）に入れる
    let mut pending: BTreeMap<usize, String> = BTreeMap::new();
    if let Some(dimension) = &patch.dimension {
        pending.insert(order("dimension"), format!("<dimension ref=\"{}\"/>", dimension));
    }
    if !cols.is_empty() {
        let xml: String = cols.iter().map(|(c, w)| col_xml(*c, *w)).collect();
        pending.insert(order("cols"), format!("<cols>{}</cols>", xml));
    }
    if let Some(merges) = merges.as_ref().filter(|m| !m.is_empty()) {
        pending.insert(order("mergeCells"), merges.clone());
    }
    if let Some(rid) = &patch.legacy_drawing {
        pending.insert(order("legacyDrawing"), format!("<legacyDrawing r:id=\"{}\"/>", rid));
    }

    let mut out = String::with_capacity(xml.len() + 4096);
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut skip: Option<usize> = None;
    let mut in_cols = false;
    let mut in_sheet_data = false;
    let mut row_edit: Option<RowEdit> = None;
    let mut last_row = 0u32;
    let mut next_col = 1u32;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| AppError::Workbook(format!("Failed to parse worksheet XML: {}", e)))?;
        let raw = &xml[before..reader.buffer_position() as usize];

        // 置き換えた要素の中身は捨てる
        if let Some(level) = skip {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == level {
                        skip = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                let name = local.as_ref();

                match depth {
                    0 => {
                        let declared = e.attributes().flatten().any(|a| a.key.as_ref() == b"xmlns:r");
                        if patch.legacy_drawing.is_some() && !declared {
                            let ns = [(
                                "xmlns:r",
                                "http://schemas.openxmlformats.org/officeDocument/2006/relationships"
                                    .to_string(),
                            )];
                            out.push_str(&start_tag(e, &ns, &[], is_empty));
                        } else {
                            out.push_str(raw);
                        }
                    }
                    1 => {
                        if let Some(idx) = order_of(name) {
                            flush_pending(&mut pending, idx, &mut out);
                            pending.remove(&idx);
                        }
                        match name {
                            b"dimension" => match &patch.dimension {
                                Some(dimension) => {
                                    let set = [("ref", dimension.clone())];
                                    out.push_str(&start_tag(e, &set, &[], is_empty));
                                }
                                None => out.push_str(raw),
                            },
                            b"cols" if !cols.is_empty() => {
                                if is_empty {
                                    out.push_str("<cols>");
                                    flush_cols(&mut cols, u32::MAX, &mut out);
                                    out.push_str("</cols>");
                                } else {
                                    out.push_str(raw);
                                    in_cols = true;
                                }
                            }
                            b"sheetData" => {
                                if is_empty {
                                    out.push_str("<sheetData>");
                                    flush_rows(&mut rows, u32::MAX, &mut out);
                                    out.push_str("</sheetData>");
                                } else {
                                    out.push_str(raw);
                                    in_sheet_data = true;
                                }
                            }
                            b"mergeCells" if merges.is_some() => {
                                out.push_str(merges.as_deref().unwrap_or_default());
                                if !is_empty {
                                    skip = Some(depth);
                                }
                            }
                            _ => out.push_str(raw),
                        }
                    }
                    2 if in_cols && name == b"col" => {
                        let min: u32 = attr_parse(e, b"min").unwrap_or(1);
                        let max: u32 = attr_parse(e, b"max").unwrap_or(min);
                        flush_cols(&mut cols, min, &mut out);

                        let inside: Vec<(u32, f64)> =
                            cols.range(min..=max).map(|(c, w)| (*c, *w)).collect();
                        if inside.is_empty() {
                            out.push_str(raw);
                        } else {
                            // 範囲指定の <col> を分割して、変更した列だけ幅を差し替える
                            let mut cursor = min;
                            for (col, width) in inside {
                                cols.remove(&col);
                                if cursor < col {
                                    let span = [("min", cursor.to_string()), ("max", (col - 1).to_string())];
                                    out.push_str(&start_tag(e, &span, &[], true));
                                }
                                let edited = [
                                    ("min", col.to_string()),
                                    ("max", col.to_string()),
                                    ("width", width.to_string()),
                                    ("customWidth", "1".to_string()),
                                ];
                                out.push_str(&start_tag(e, &edited, &[], true));
                                cursor = col + 1;
                            }
                            if cursor <= max {
                                let span = [("min", cursor.to_string()), ("max", max.to_string())];
                                out.push_str(&start_tag(e, &span, &[], true));
                            }
                            if !is_empty {
                                skip = Some(depth);
                            }
                        }
                    }
                    2 if in_sheet_data && name == b"row" => {
                        let row: u32 = attr_parse(e, b"r").unwrap_or(last_row + 1);
                        last_row = row;
                        next_col = 1;
                        flush_rows(&mut rows, row, &mut out);

                        match rows.remove(&row) {
                            Some(mut edit) => {
                                out.push_str(&start_tag(e, &height_attrs(edit.height), &["spans"], false));
                                if is_empty {
                                    flush_cells(&mut edit.cells, u32::MAX, &mut out);
                                    out.push_str("</row>");
                                } else {
                                    row_edit = Some(edit);
                                }
                            }
                            None => out.push_str(raw),
                        }
                    }
                    3 if in_sheet_data && name == b"c" => {
                        let col = attr_string(e, b"r")
                            .as_deref()
                            .and_then(parse_cell_ref)
                            .map_or(next_col, |(_, c)| c);
                        next_col = col + 1;

                        match row_edit.as_mut() {
                            Some(edit) => {
                                flush_cells(&mut edit.cells, col, &mut out);
                                match edit.cells.remove(&col) {
                                    Some(replacement) => {
                                        if let Some(cell) = replacement {
                                            out.push_str(&cell);
                                        }
                                        if !is_empty {
                                            skip = Some(depth);
                                        }
                                    }
                                    None => out.push_str(raw),
                                }
                            }
                            None => out.push_str(raw),
                        }
                    }
                    _ => out.push_str(raw),
                }

                if !is_empty {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match depth {
                    0 => {
                        flush_pending(&mut pending, usize::MAX, &mut out);
                    }
                    1 if in_cols => {
                        flush_cols(&mut cols, u32::MAX, &mut out);
                        in_cols = false;
                    }
                    1 if in_sheet_data => {
                        flush_rows(&mut rows, u32::MAX, &mut out);
                        in_sheet_data = false;
                    }
                    2 if in_sheet_data => {
                        if let Some(mut edit) = row_edit.take() {
                            flush_cells(&mut edit.cells, u32::MAX, &mut out);
                        }
                    }
                    _ => {}
                }
                out.push_str(raw);
            }
            _ => out.push_str(raw),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:D3"/><sheetViews><sheetView tabSelected="1" workbookViewId="0"><pane xSplit="2" ySplit="1" topLeftCell="C2" activePane="bottomRight" state="frozen"/></sheetView></sheetViews><sheetFormatPr defaultRowHeight="15"/><cols><col min="1" max="6" width="12.7109375" customWidth="1"/></cols><sheetData><row r="1" spans="1:4"><c r="B1" s="1" t="s"><v>0</v></c><c r="D1" s="2" t="s"><v>1</v></c></row><row r="3" spans="1:4"><c r="D3" s="3"><v>7</v></c></row></sheetData><conditionalFormatting sqref="D2:D9"><cfRule type="cellIs" dxfId="0" priority="1" operator="equal"><formula>"Yes"</formula></cfRule></conditionalFormatting><hyperlinks><hyperlink ref="B1" r:id="rId1"/></hyperlinks><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

    #[test]
    fn test_patch_keeps_untouched_elements() {
        let mut patch = SheetPatch::default();
        patch.cells.insert((1, 5), Some(r#"<c r="E1" s="2" t="inlineStr"><is><t xml:space="preserve">Acme</t></is></c>"#.into()));
        patch.cells.insert((3, 4), Some(r#"<c r="D3" s="3"><v>9</v></c>"#.into()));
        patch.cells.insert((2, 5), Some(r#"<c r="E2" s="4" t="inlineStr"><is><t xml:space="preserve">Yes</t></is></c>"#.into()));
        patch.row_heights.insert(2, 30.0);
        patch.col_widths.insert(5, 30.7109375);
        patch.dimension = Some("A1:E3".into());

        let patched = patch_worksheet(SHEET, &patch).unwrap();

        assert!(patched.contains(r#"<pane xSplit="2" ySplit="1" topLeftCell="C2" activePane="bottomRight" state="frozen"/>"#));
        assert!(patched.contains(r#"<hyperlinks><hyperlink ref="B1" r:id="rId1"/></hyperlinks>"#));
        assert!(patched.contains(r#"<conditionalFormatting sqref="D2:D9">"#));
        assert!(patched.contains(r#"<dimension ref="A1:E3"/>"#));

        // 範囲指定の列幅が分割される
        assert!(patched.contains(
            r#"<cols><col min="1" max="4" width="12.7109375" customWidth="1"/><col min="5" max="5" width="30.7109375" customWidth="1"/><col min="6" max="6" width="12.7109375" customWidth="1"/></cols>"#
        ));

        // 既存行にセルを足し、新しい行を差し込み、既存セルを置き換える
        assert!(patched.contains(r#"<row r="1"><c r="B1" s="1" t="s"><v>0</v></c><c r="D1" s="2" t="s"><v>1</v></c><c r="E1" s="2" t="inlineStr">"#));
        assert!(patched.contains(r#"<row r="2" ht="30" customHeight="1"><c r="E2" s="4""#));
        assert!(!patched.contains(r#"spans="1:4"><c r="D3""#));
        assert!(patched.contains(r#"<row r="3"><c r="D3" s="3"><v>9</v></c></row>"#));
        assert!(patched.find(r#"<row r="2""#).unwrap() < patched.find(r#"<row r="3""#).unwrap());
    }

    #[test]
    fn test_patch_without_changes_is_identity() {
        let patched = patch_worksheet(SHEET, &SheetPatch::default()).unwrap();
        assert_eq!(patched, SHEET);
    }

    #[test]
    fn test_patch_inserts_missing_elements_in_order() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData/><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;
        let mut patch = SheetPatch::default();
        patch.cells.insert((1, 1), Some(r#"<c r="A1"><v>1</v></c>"#.into()));
        patch.col_widths.insert(1, 20.7109375);
        patch.merges = Some(vec![MergeRange {
            first_row: 10,
            first_col: 1,
            last_row: 10,
            last_col: 3,
        }]);
        patch.legacy_drawing = Some("rId2".into());

        let patched = patch_worksheet(xml, &patch).unwrap();

        assert!(patched.contains("xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\""));
        assert!(patched.contains(r#"<sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData>"#));
        let views = patched.find("<sheetViews>").unwrap();
        let cols = patched.find("<cols>").unwrap();
        let data = patched.find("<sheetData>").unwrap();
        let merges = patched.find(r#"<mergeCells count="1"><mergeCell ref="A10:C10"/></mergeCells>"#).unwrap();
        let margins = patched.find("<pageMargins").unwrap();
        let legacy = patched.find(r#"<legacyDrawing r:id="rId2"/>"#).unwrap();
        assert!(views < cols && cols < data && data < merges && merges < margins && margins < legacy);
    }

    #[test]
    fn test_patch_cells_without_references() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c><v>3</v></c></row></sheetData></worksheet>"#;
        let mut patch = SheetPatch::default();
        patch.cells.insert((1, 2), Some(r#"<c r="B1"><v>20</v></c>"#.into()));
        patch.cells.insert((2, 1), None);

        let patched = patch_worksheet(xml, &patch).unwrap();

        assert_eq!(
            patched,
            r#"<worksheet><sheetData><row><c><v>1</v></c><c r="B1"><v>20</v></c></row><row></row></sheetData></worksheet>"#
        );
    }
}
