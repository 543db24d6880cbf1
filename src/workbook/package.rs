//! 読み込み元の xlsx パッケージへの差分書き戻し
//!
//! 編集したワークシート・スタイル・メモのパーツだけを書き換え、
//! それ以外のパーツ（テーマ、図、定義名、外部リンクなど）は圧縮データのままコピーする。

use super::model::{Cell, CellValue, Sheet, Style, Workbook};
use super::notes::{new_comments_xml, new_vml, patch_comments_xml, patch_vml, vml_blocks, NoteChanges};
use super::ooxml::{
    attr_string, cell_ref, next_relationship_id, parse_relationships, read_zip_file, rels_path_for,
    resolve_part, StyleSheet,
};
use super::sheet_patch::{patch_worksheet, SheetPatch};
use super::style_table::{patch_styles_xml, StyleRegistry};
use crate::error::{AppError, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::{Cursor, Read, Seek, Write};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const COMMENTS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
const VML_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
const COMMENTS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
const VML_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";

const CONTENT_TYPES: &str = "[Content_Types].xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const CALC_CHAIN: &str = "xl/calcChain.xml";
const STYLES: &str = "xl/styles.xml";

const EMPTY_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

/// 読み込んだ xlsx の元データ
pub(crate) struct SourcePackage {
    pub bytes: Vec<u8>,
    pub styles: StyleSheet,
    /// シート名 → ワークシートXMLのパス
    pub sheet_paths: HashMap<String, String>,
}

impl fmt::Debug for SourcePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePackage")
            .field("bytes", &self.bytes.len())
            .field("styles", &self.styles.styles.len())
            .field("sheet_paths", &self.sheet_paths)
            .finish()
    }
}

impl SourcePackage {
    /// シートの追加・削除・改名がなければ差分で書き戻せる
    pub fn matches(&self, workbook: &Workbook) -> bool {
        workbook.sheets.len() == self.sheet_paths.len()
            && workbook.sheets.iter().all(|s| self.sheet_paths.contains_key(&s.name))
    }
}

fn zip_err(e: ZipError) -> AppError {
    AppError::Workbook(format!("xlsx package error: {}", e))
}

/// 文字数単位の列幅 → XML上の列幅（余白込み、1/256 単位で切り捨て）
pub(crate) fn file_width(chars: f64) -> f64 {
    ((chars * 7.0 + 5.0) / 7.0 * 256.0).trunc() / 256.0
}

/// セル → `<c>` 要素。値もスタイルもなければ None
pub(crate) fn cell_xml(row: u32, col: u32, cell: &Cell, style_id: u32) -> Option<String> {
    let r = cell_ref(row, col);
    let s = if style_id > 0 {
        format!(" s=\"{}\"", style_id)
    } else {
        String::new()
    };

    let xml = match &cell.value {
        CellValue::Empty if style_id == 0 => return None,
        CellValue::Empty => format!("<c r=\"{}\"{}/>", r, s),
        CellValue::Text(text) => format!(
            "<c r=\"{}\"{} t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
            r,
            s,
            escape(text.as_str())
        ),
        CellValue::Number(n) => format!("<c r=\"{}\"{}><v>{}</v></c>", r, s, n),
        CellValue::Bool(b) => format!("<c r=\"{}\"{} t=\"b\"><v>{}</v></c>", r, s, u8::from(*b)),
        CellValue::Formula { formula, cached } => {
            let f = escape(formula.as_str());
            match cached {
                Some(v) if v.parse::<f64>().is_ok() => {
                    format!("<c r=\"{}\"{}><f>{}</f><v>{}</v></c>", r, s, f, v)
                }
                Some(v) => format!(
                    "<c r=\"{}\"{} t=\"str\"><f>{}</f><v>{}</v></c>",
                    r,
                    s,
                    f,
                    escape(v.as_str())
                ),
                None => format!("<c r=\"{}\"{}><f>{}</f></c>", r, s, f),
            }
        }
    };
    Some(xml)
}

fn dimension_ref(sheet: &Sheet) -> String {
    match (sheet.max_row(), sheet.max_col()) {
        (0, _) | (_, 0) => "A1".to_string(),
        (row, col) => format!("A1:{}", cell_ref(row, col)),
    }
}

fn cell_content(cell: Option<&Cell>) -> Option<(&CellValue, &Style, Option<u32>)> {
    cell.map(|c| (&c.value, &c.style, c.style_id))
}

fn is_formula(cell: Option<&Cell>) -> bool {
    matches!(cell.map(|c| &c.value), Some(CellValue::Formula { .. }))
}

/// 1シート分のメモの変更
#[derive(Default)]
struct NoteEdits {
    changes: NoteChanges,
    /// メモが新しく付いたセル
    added: Vec<(u32, u32)>,
    /// メモがなくなったセル
    removed: BTreeSet<(u32, u32)>,
}

/// 書き換え・追加・削除するパーツ
#[derive(Default)]
struct PartEdits {
    replaced: HashMap<String, String>,
    added: Vec<(String, String)>,
    removed: HashSet<String>,
    /// 追加パーツの (パス, ContentType)
    overrides: Vec<(String, &'static str)>,
    vml_added: bool,
}

impl PartEdits {
    /// "xl/comments" + N + ".xml" のうち未使用の名前
    fn unused_name(&self, names: &HashSet<String>, stem: &str, ext: &str) -> String {
        (1..)
            .map(|n| format!("{}{}{}", stem, n, ext))
            .find(|p| !names.contains(p) && !self.added.iter().any(|(a, _)| a == p))
            .unwrap_or_default()
    }
}

/// 新しく作るVMLの idmap ブロック番号（既存VMLと重ならないもの）
fn first_free_vml_block<R: Read + Seek>(archive: &mut ZipArchive<R>, names: &HashSet<String>) -> u32 {
    let mut max = 0;
    for name in names.iter().filter(|n| n.ends_with(".vml")) {
        if let Ok(xml) = read_zip_file(archive, name) {
            max = vml_blocks(&xml).into_iter().fold(max, u32::max);
        }
    }
    max + 1
}

/// 空要素のうち条件に合うものを取り除く
fn drop_elements(xml: &str, name: &[u8], matches: impl Fn(&BytesStart) -> bool) -> Result<String> {
    let mut out = String::with_capacity(xml.len());
    let mut reader = Reader::from_str(xml);
    loop {
        let before = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| AppError::Workbook(format!("Failed to parse package XML: {}", e)))?;
        let raw = &xml[before..reader.buffer_position() as usize];
        match event {
            Event::Eof => break,
            Event::Empty(ref e) if e.local_name().as_ref() == name && matches(e) => {}
            _ => out.push_str(raw),
        }
    }
    Ok(out)
}

fn insert_before(xml: &str, closing: &str, content: &str) -> Option<String> {
    let end = xml.rfind(closing)?;
    Some(format!("{}{}{}", &xml[..end], content, &xml[end..]))
}

fn append_relationships(xml: &str, rels: &[(String, &str, String)]) -> String {
    let entries: String = rels
        .iter()
        .map(|(id, kind, target)| {
            format!("<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"/>", id, kind, escape(target.as_str()))
        })
        .collect();
    insert_before(xml, "</Relationships>", &entries)
        .or_else(|| insert_before(EMPTY_RELS, "</Relationships>", &entries))
        .unwrap_or_default()
}

/// メモの変更をコメントXMLとVMLに反映する。VMLを新しく作ったらその r:id を返す
fn write_notes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    names: &HashSet<String>,
    sheet_path: &str,
    notes: &NoteEdits,
    parts: &mut PartEdits,
    vml_block: &mut u32,
) -> Result<Option<String>> {
    let (changes, added, removed) = (&notes.changes, notes.added.as_slice(), &notes.removed);
    let rels_path = rels_path_for(sheet_path);
    let rels_xml = names
        .contains(&rels_path)
        .then(|| read_zip_file(archive, &rels_path))
        .transpose()
        .map_err(AppError::Workbook)?;
    let rels = rels_xml.as_deref().map(parse_relationships).unwrap_or_default();
    let base_dir = sheet_path.rsplit_once('/').map_or("", |(dir, _)| dir);
    let part_of = |suffix: &str| {
        rels.iter()
            .find(|(_, kind, _)| kind.ends_with(suffix))
            .map(|(_, _, target)| resolve_part(base_dir, target))
    };
    let mut new_rels: Vec<(String, &str, String)> = Vec::new();

    match part_of("/comments") {
        Some(path) => {
            let xml = read_zip_file(archive, &path).map_err(AppError::Workbook)?;
            parts.replaced.insert(path, patch_comments_xml(&xml, changes)?);
        }
        None => {
            let path = parts.unused_name(names, "xl/comments", ".xml");
            new_rels.push((next_relationship_id(&rels, new_rels.len()), COMMENTS_REL, format!("/{}", path)));
            parts.overrides.push((path.clone(), COMMENTS_CONTENT_TYPE));
            parts.added.push((path, new_comments_xml(changes)?));
        }
    }

    let mut legacy_drawing = None;
    match part_of("/vmlDrawing") {
        Some(path) if !added.is_empty() || !removed.is_empty() => {
            let xml = read_zip_file(archive, &path).map_err(AppError::Workbook)?;
            parts.replaced.insert(path, patch_vml(&xml, added, removed)?);
        }
        None if !added.is_empty() => {
            let path = parts.unused_name(names, "xl/drawings/vmlDrawing", ".vml");
            let id = next_relationship_id(&rels, new_rels.len());
            new_rels.push((id.clone(), VML_REL, format!("/{}", path)));
            parts.added.push((path, new_vml(*vml_block, added)));
            parts.vml_added = true;
            *vml_block += 1;
            legacy_drawing = Some(id);
        }
        _ => {}
    }

    if !new_rels.is_empty() {
        let xml = append_relationships(rels_xml.as_deref().unwrap_or(EMPTY_RELS), &new_rels);
        match rels_xml {
            Some(_) => {
                parts.replaced.insert(rels_path, xml);
            }
            None => parts.added.push((rels_path, xml)),
        }
    }

    Ok(legacy_drawing)
}

/// 変更点を元のパッケージに当てた xlsx を作る
pub(crate) fn save_patched(workbook: &Workbook, source: &SourcePackage) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(source.bytes.as_slice())).map_err(zip_err)?;
    let names: HashSet<String> = archive.file_names().map(String::from).collect();

    let mut parts = PartEdits::default();
    let mut registry = StyleRegistry::new(&source.styles);
    let mut vml_block = first_free_vml_block(&mut archive, &names);
    let mut stale_calc_chain = false;

    for sheet in &workbook.sheets {
        let (Some(edits), Some(path)) = (sheet.edits(), source.sheet_paths.get(&sheet.name)) else {
            continue;
        };
        if edits.is_empty() {
            continue;
        }

        let mut patch = SheetPatch::default();
        let mut notes = NoteEdits::default();

        for (row, col, before, after) in sheet.changed_cells() {
            if cell_content(before) != cell_content(after) {
                let xml = after.and_then(|cell| {
                    let style_id = registry.resolve(&cell.style, cell.style_id);
                    cell_xml(row, col, cell, style_id)
                });
                patch.cells.insert((row, col), xml);
                // 数式を値で上書きしたら計算チェーンが古くなる
                stale_calc_chain |= is_formula(before) && !is_formula(after);
            }

            let old_note = before.and_then(|c| c.note.as_ref());
            let new_note = after.and_then(|c| c.note.as_ref());
            if old_note != new_note {
                notes.changes.insert((row, col), new_note.cloned());
                match (old_note, new_note) {
                    (None, Some(_)) => notes.added.push((row, col)),
                    (Some(_), None) => {
                        notes.removed.insert((row, col));
                    }
                    _ => {}
                }
            }
        }

        if !patch.cells.is_empty() {
            patch.dimension = Some(dimension_ref(sheet));
        }
        for &col in &edits.col_widths {
            if let Some(width) = sheet.col_width(col) {
                patch.col_widths.insert(col, file_width(width));
            }
        }
        for &row in &edits.row_heights {
            if let Some(height) = sheet.row_height(row) {
                patch.row_heights.insert(row, height);
            }
        }
        if edits.merges {
            patch.merges = Some(sheet.merges().to_vec());
        }
        if !notes.changes.is_empty() {
            patch.legacy_drawing =
                write_notes(&mut archive, &names, path, &notes, &mut parts, &mut vml_block)?;
        }

        if patch.is_empty() {
            continue;
        }
        debug!(
            "Patching '{}': {} cells, {} widths, {} heights, {} notes",
            sheet.name,
            patch.cells.len(),
            patch.col_widths.len(),
            patch.row_heights.len(),
            notes.changes.len()
        );
        let xml = read_zip_file(&mut archive, path).map_err(AppError::Workbook)?;
        parts.replaced.insert(path.clone(), patch_worksheet(&xml, &patch)?);
    }

    if names.contains(STYLES) {
        let xml = read_zip_file(&mut archive, STYLES).map_err(AppError::Workbook)?;
        if let Some(patched) = patch_styles_xml(&xml, &registry)? {
            parts.replaced.insert(STYLES.to_string(), patched);
        }
    }

    if stale_calc_chain && names.contains(CALC_CHAIN) {
        parts.removed.insert(CALC_CHAIN.to_string());
        let xml = read_zip_file(&mut archive, WORKBOOK_RELS).map_err(AppError::Workbook)?;
        let xml = drop_elements(&xml, b"Relationship", |e| {
            attr_string(e, b"Target").is_some_and(|t| t.ends_with("calcChain.xml"))
        })?;
        parts.replaced.insert(WORKBOOK_RELS.to_string(), xml);
    }

    if !parts.overrides.is_empty() || parts.vml_added || !parts.removed.is_empty() {
        let mut xml = read_zip_file(&mut archive, CONTENT_TYPES).map_err(AppError::Workbook)?;
        if parts.removed.contains(CALC_CHAIN) {
            let part_name = format!("/{}", CALC_CHAIN);
            xml = drop_elements(&xml, b"Override", |e| {
                attr_string(e, b"PartName").as_deref() == Some(part_name.as_str())
            })?;
        }
        let mut entries = String::new();
        if parts.vml_added && !xml.contains("Extension=\"vml\"") {
            entries.push_str(&format!("<Default Extension=\"vml\" ContentType=\"{}\"/>", VML_CONTENT_TYPE));
        }
        for (path, content_type) in &parts.overrides {
            entries.push_str(&format!("<Override PartName=\"/{}\" ContentType=\"{}\"/>", path, content_type));
        }
        let xml = insert_before(&xml, "</Types>", &entries).ok_or_else(|| {
            AppError::Workbook(format!("{} has no Types element", CONTENT_TYPES))
        })?;
        parts.replaced.insert(CONTENT_TYPES.to_string(), xml);
    }

    info!(
        "Writing xlsx: {} parts rewritten, {} added, {} removed",
        parts.replaced.len(),
        parts.added.len(),
        parts.removed.len()
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i).map_err(zip_err)?;
        let name = file.name().to_string();
        if parts.removed.contains(&name) {
            continue;
        }
        match parts.replaced.get(&name) {
            Some(content) => {
                writer.start_file(name, options).map_err(zip_err)?;
                writer.write_all(content.as_bytes())?;
            }
            None => writer.raw_copy_file(file).map_err(zip_err)?,
        }
    }
    for (name, content) in &parts.added {
        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        writer.write_all(content.as_bytes())?;
    }

    Ok(writer.finish().map_err(zip_err)?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_width() {
        assert_eq!(file_width(30.0), 30.7109375);
        assert_eq!(file_width(32.0), 32.7109375);
        assert_eq!(file_width(8.43), 9.140625);
    }

    #[test]
    fn test_cell_xml() {
        let mut cell = Cell {
            value: CellValue::Text("Fees & <discounts>".into()),
            ..Default::default()
        };
        assert_eq!(
            cell_xml(2, 5, &cell, 7).as_deref(),
            Some(r#"<c r="E2" s="7" t="inlineStr"><is><t xml:space="preserve">Fees &amp; &lt;discounts&gt;</t></is></c>"#)
        );

        cell.value = CellValue::Number(1250.5);
        assert_eq!(cell_xml(3, 1, &cell, 0).as_deref(), Some(r#"<c r="A3"><v>1250.5</v></c>"#));

        cell.value = CellValue::Formula {
            formula: "IF(D2=\"Yes\",1,0)".into(),
            cached: Some("1".into()),
        };
        assert_eq!(
            cell_xml(4, 3, &cell, 0).as_deref(),
            Some(r#"<c r="C4"><f>IF(D2=&quot;Yes&quot;,1,0)</f><v>1</v></c>"#)
        );

        cell.value = CellValue::Empty;
        assert_eq!(cell_xml(4, 3, &cell, 0), None);
        assert_eq!(cell_xml(4, 3, &cell, 2).as_deref(), Some(r#"<c r="C4" s="2"/>"#));
    }

    #[test]
    fn test_append_relationships() {
        let rels = vec![("rId2".to_string(), COMMENTS_REL, "/xl/comments1.xml".to_string())];
        let xml = append_relationships(EMPTY_RELS, &rels);
        assert!(xml.ends_with(
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="/xl/comments1.xml"/></Relationships>"#
        ));
        assert_eq!(parse_relationships(&xml).len(), 1);
    }

    #[test]
    fn test_drop_elements() {
        let xml = r#"<Types><Override PartName="/xl/calcChain.xml" ContentType="x"/><Override PartName="/xl/styles.xml" ContentType="y"/></Types>"#;
        let kept = drop_elements(xml, b"Override", |e| {
            attr_string(e, b"PartName").as_deref() == Some("/xl/calcChain.xml")
        })
        .unwrap();
        assert_eq!(kept, r#"<Types><Override PartName="/xl/styles.xml" ContentType="y"/></Types>"#);
    }
}
