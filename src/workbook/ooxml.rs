//! xlsx (OOXML) パーツの直接解析
//!
//! calamine が読まない情報をZIP内のXMLから取り出す:
//! - xl/styles.xml: cellXfs → Style
//! - ワークシートXML: セルごとのスタイルID、列幅、行高、結合範囲
//! - コメントXML: セルのメモ
//! - リレーション: シート名 → ワークシートXML、ワークシート → コメントXML

use super::model::{
    Alignment, Border, BorderLine, Edge, Fill, Font, HAlign, MergeRange, Note, NumberFormat,
    Protection, Rgb, Style, VAlign,
};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

// =============================================================================
// 共通ヘルパー
// =============================================================================

/// XML定義済み実体（&amp; &lt; &gt; &quot; &apos;）と数値参照を戻す
pub(crate) fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.find(';') {
            Some(end) => {
                let entity = &tail[1..end];
                match decode_entity(entity) {
                    Some(ch) => out.push(ch),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

pub(crate) fn attr_string(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| unescape_xml(&String::from_utf8_lossy(&a.value)))
}

pub(crate) fn attr_parse<T: std::str::FromStr>(e: &BytesStart, key: &[u8]) -> Option<T> {
    attr_string(e, key).and_then(|s| s.trim().parse().ok())
}

/// 真偽属性（"1" / "true"）。属性なしは `default`
fn attr_flag(e: &BytesStart, key: &[u8], default: bool) -> bool {
    match attr_string(e, key) {
        Some(v) => v == "1" || v == "true",
        None => default,
    }
}

/// 属性を差し替えた開始タグ（元の属性値はエスケープ済みのまま写す）
pub(crate) fn start_tag(e: &BytesStart, set: &[(&str, String)], remove: &[&str], empty: bool) -> String {
    let mut tag = format!("<{}", String::from_utf8_lossy(e.name().as_ref()));
    let mut replaced = vec![false; set.len()];
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref());
        if remove.contains(&key.as_ref()) {
            continue;
        }
        match set.iter().position(|(k, _)| *k == key) {
            Some(i) => {
                replaced[i] = true;
                tag.push_str(&format!(" {}=\"{}\"", key, escape(set[i].1.as_str())));
            }
            None => tag.push_str(&format!(" {}=\"{}\"", key, String::from_utf8_lossy(&attr.value))),
        }
    }
    for ((key, value), done) in set.iter().zip(replaced) {
        if !done {
            tag.push_str(&format!(" {}=\"{}\"", key, escape(value.as_str())));
        }
    }
    tag.push_str(if empty { "/>" } else { ">" });
    tag
}

/// "B5" → (5, 2)（1始まり）
pub(crate) fn parse_cell_ref(r: &str) -> Option<(u32, u32)> {
    let r = r.replace('$', "");
    let split = r.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = r.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let col = letters
        .chars()
        .fold(0u32, |acc, ch| acc * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1));
    let row: u32 = digits.parse().ok()?;
    (row > 0).then_some((row, col))
}

/// 列番号 → 列記号（1 → "A", 27 → "AA"）
pub(crate) fn col_letters(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// (5, 2) → "B5"
pub(crate) fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", col_letters(col), row)
}

/// "A1:C3" → 結合範囲
pub(crate) fn parse_merge_ref(r: &str) -> Option<MergeRange> {
    let (start, end) = r.split_once(':')?;
    let (first_row, first_col) = parse_cell_ref(start)?;
    let (last_row, last_col) = parse_cell_ref(end)?;
    Some(MergeRange {
        first_row,
        first_col,
        last_row,
        last_col,
    })
}

/// ZIP内のファイルを文字列で読む
pub(crate) fn read_zip_file<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String, String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| format!("File '{}' not found in XLSX: {}", path, e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Ok(content)
}

/// リレーションのTargetをパッケージ内の絶対パスに解決する
///
/// `base_dir` はリレーション元パーツのディレクトリ（例: "xl/worksheets"）
pub(crate) fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// "xl/worksheets/sheet1.xml" → "xl/worksheets/_rels/sheet1.xml.rels"
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

// =============================================================================
// 色
// =============================================================================

/// Excel標準のインデックスカラー（8〜63）
const INDEXED_PALETTE: [u32; 56] = [
    0x000000, 0xFFFFFF, 0xFF0000, 0x00FF00, 0x0000FF, 0xFFFF00, 0xFF00FF, 0x00FFFF,
    0x800000, 0x008000, 0x000080, 0x808000, 0x800080, 0x008080, 0xC0C0C0, 0x808080,
    0x9999FF, 0x993366, 0xFFFFCC, 0xCCFFFF, 0x660066, 0xFF8080, 0x0066CC, 0xCCCCFF,
    0x000080, 0xFF00FF, 0xFFFF00, 0x00FFFF, 0x800080, 0x800000, 0x008080, 0x0000FF,
    0x00CCFF, 0xCCFFFF, 0xCCFFCC, 0xFFFF99, 0x99CCFF, 0xFF99CC, 0xCC99FF, 0xFFCC99,
    0x3366FF, 0x33CCCC, 0x99CC00, 0xFFCC00, 0xFF9900, 0xFF6600, 0x666699, 0x969696,
    0x003366, 0x339966, 0x003300, 0x333300, 0x993300, 0x993366, 0x333399, 0x333333,
];

fn indexed_color(idx: u32) -> Option<Rgb> {
    match idx {
        0..=7 => INDEXED_PALETTE.get(idx as usize).copied().map(Rgb),
        8..=63 => INDEXED_PALETTE.get(idx as usize - 8).copied().map(Rgb),
        _ => None, // 64/65 はシステム色
    }
}

/// 既定テーマ（Office）の近似色。tintは無視
fn theme_color(idx: u32) -> Option<Rgb> {
    let rgb = match idx {
        0 => 0xFFFFFF,
        1 => 0x000000,
        2 => 0xEEECE1,
        3 => 0x1F497D,
        4 => 0x4F81BD,
        5 => 0xC0504D,
        6 => 0x9BBB59,
        7 => 0x8064A2,
        8 => 0x4BACC6,
        9 => 0xF79646,
        _ => return None,
    };
    Some(Rgb(rgb))
}

/// rgb > indexed > theme の優先順で色を読む
fn parse_color(e: &BytesStart) -> Option<Rgb> {
    if let Some(hex) = attr_string(e, b"rgb") {
        return Rgb::from_hex(&hex);
    }
    if let Some(idx) = attr_parse::<u32>(e, b"indexed") {
        return indexed_color(idx);
    }
    attr_parse::<u32>(e, b"theme").and_then(theme_color)
}

// =============================================================================
// styles.xml
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
    /// cellStyleXfs / dxfs など読み飛ばす区間
    Skip,
}

/// cellXfs の1要素が参照するID
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct XfEntry {
    pub num_fmt_id: u32,
    pub font_id: usize,
    pub fill_id: usize,
    pub border_id: usize,
    /// 親のセルスタイル（cellStyleXfs）
    pub xf_id: usize,
    pub alignment: Alignment,
    pub protection: Protection,
}

/// styles.xml の内容
///
/// `styles` は cellXfs の並び順。書き戻し時に新しい xf を足すため、
/// 部品（フォント・塗り・罫線）の一覧とフォントの元XMLも保持する。
#[derive(Debug, Clone, Default)]
pub(crate) struct StyleSheet {
    pub styles: Vec<Style>,
    pub xfs: Vec<XfEntry>,
    pub fonts: Vec<Font>,
    pub font_xml: Vec<String>,
    pub fills: Vec<Fill>,
    pub borders: Vec<Border>,
    pub num_fmts: HashMap<u32, String>,
}

fn h_align(value: &str) -> HAlign {
    match value {
        "left" => HAlign::Left,
        "center" => HAlign::Center,
        "right" => HAlign::Right,
        "fill" => HAlign::Fill,
        "justify" | "distributed" => HAlign::Justify,
        "centerContinuous" => HAlign::CenterAcross,
        _ => HAlign::General,
    }
}

fn v_align(value: &str) -> VAlign {
    match value {
        "top" => VAlign::Top,
        "center" => VAlign::Center,
        "justify" | "distributed" => VAlign::Justify,
        _ => VAlign::Bottom,
    }
}

fn read_xf(e: &BytesStart) -> XfEntry {
    XfEntry {
        num_fmt_id: attr_parse(e, b"numFmtId").unwrap_or(0),
        font_id: attr_parse(e, b"fontId").unwrap_or(0),
        fill_id: attr_parse(e, b"fillId").unwrap_or(0),
        border_id: attr_parse(e, b"borderId").unwrap_or(0),
        xf_id: attr_parse(e, b"xfId").unwrap_or(0),
        ..Default::default()
    }
}

fn font_property(font: &mut Font, e: &BytesStart) {
    match e.name().as_ref() {
        b"b" => font.bold = attr_flag(e, b"val", true),
        b"i" => font.italic = attr_flag(e, b"val", true),
        b"u" => font.underline = attr_string(e, b"val").map_or(true, |v| v != "none"),
        b"strike" => font.strikethrough = attr_flag(e, b"val", true),
        b"sz" => font.size = attr_parse(e, b"val"),
        b"color" => font.color = parse_color(e),
        b"name" => font.name = attr_string(e, b"val"),
        _ => {}
    }
}

fn border_side<'a>(border: &'a mut Border, name: &[u8]) -> Option<&'a mut Edge> {
    match name {
        b"left" | b"start" => Some(&mut border.left),
        b"right" | b"end" => Some(&mut border.right),
        b"top" => Some(&mut border.top),
        b"bottom" => Some(&mut border.bottom),
        _ => None,
    }
}

/// styles.xml を解析する
pub(crate) fn parse_styles_xml(xml: &str) -> StyleSheet {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut section = Section::None;
    let mut num_fmts: HashMap<u32, String> = HashMap::new();
    let mut fonts: Vec<Font> = Vec::new();
    let mut font_xml: Vec<String> = Vec::new();
    let mut font_start = 0usize;
    let mut fills: Vec<Fill> = Vec::new();
    let mut borders: Vec<Border> = Vec::new();
    let mut xfs: Vec<XfEntry> = Vec::new();

    let mut font = Font::default();
    let mut fill = Fill::default();
    let mut solid = false;
    let mut border = Border::default();
    let mut side: Option<Vec<u8>> = None;
    let mut xf: Option<XfEntry> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf);
        let is_empty = matches!(event, Ok(Event::Empty(_)));
        match event {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                match (section, name.as_ref()) {
                    (Section::None, b"numFmts") if !is_empty => section = Section::NumFmts,
                    (Section::None, b"fonts") if !is_empty => section = Section::Fonts,
                    (Section::None, b"fills") if !is_empty => section = Section::Fills,
                    (Section::None, b"borders") if !is_empty => section = Section::Borders,
                    (Section::None, b"cellXfs") if !is_empty => section = Section::CellXfs,
                    (Section::None, b"cellStyleXfs" | b"dxfs" | b"extLst") if !is_empty => {
                        section = Section::Skip
                    }

                    (Section::NumFmts, b"numFmt") => {
                        if let (Some(id), Some(code)) =
                            (attr_parse::<u32>(e, b"numFmtId"), attr_string(e, b"formatCode"))
                        {
                            num_fmts.insert(id, code);
                        }
                    }

                    (Section::Fonts, b"font") => {
                        font = Font::default();
                        font_start = before;
                        if is_empty {
                            fonts.push(Font::default());
                            font_xml.push(slice(xml, before, reader.buffer_position() as usize));
                        }
                    }
                    (Section::Fonts, _) => font_property(&mut font, e),

                    (Section::Fills, b"fill") => {
                        fill = Fill::default();
                        solid = false;
                        if is_empty {
                            fills.push(Fill::default());
                        }
                    }
                    (Section::Fills, b"patternFill") => {
                        solid = attr_string(e, b"patternType").as_deref() == Some("solid");
                    }
                    (Section::Fills, b"fgColor") if solid => fill.color = parse_color(e),

                    (Section::Borders, b"border") => {
                        border = Border::default();
                        if is_empty {
                            borders.push(Border::default());
                        }
                    }
                    (Section::Borders, b"color") => {
                        if let Some(current) = side.as_deref() {
                            if let Some(edge) = border_side(&mut border, current) {
                                edge.color = parse_color(e);
                            }
                        }
                    }
                    (Section::Borders, side_name) => {
                        let line = attr_string(e, b"style")
                            .map(|s| BorderLine::from_xml(&s))
                            .unwrap_or_default();
                        if let Some(edge) = border_side(&mut border, side_name) {
                            edge.line = line;
                            if !is_empty {
                                side = Some(side_name.to_vec());
                            }
                        }
                    }

                    (Section::CellXfs, b"xf") => {
                        let entry = read_xf(e);
                        if is_empty {
                            xfs.push(entry);
                        } else {
                            xf = Some(entry);
                        }
                    }
                    (Section::CellXfs, b"alignment") => {
                        if let Some(entry) = xf.as_mut() {
                            entry.alignment = Alignment {
                                horizontal: attr_string(e, b"horizontal")
                                    .map(|v| h_align(&v))
                                    .unwrap_or_default(),
                                vertical: attr_string(e, b"vertical")
                                    .map(|v| v_align(&v))
                                    .unwrap_or_default(),
                                wrap_text: attr_flag(e, b"wrapText", false),
                                indent: attr_parse(e, b"indent").unwrap_or(0),
                            };
                        }
                    }
                    (Section::CellXfs, b"protection") => {
                        if let Some(entry) = xf.as_mut() {
                            entry.protection = Protection {
                                locked: attr_flag(e, b"locked", true),
                                hidden: attr_flag(e, b"hidden", false),
                            };
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match (section, e.name().as_ref()) {
                (Section::NumFmts, b"numFmts")
                | (Section::Fonts, b"fonts")
                | (Section::Fills, b"fills")
                | (Section::Borders, b"borders")
                | (Section::CellXfs, b"cellXfs")
                | (Section::Skip, b"cellStyleXfs" | b"dxfs" | b"extLst") => section = Section::None,
                (Section::Fonts, b"font") => {
                    fonts.push(std::mem::take(&mut font));
                    font_xml.push(slice(xml, font_start, reader.buffer_position() as usize));
                }
                (Section::Fills, b"fill") => fills.push(std::mem::take(&mut fill)),
                (Section::Borders, b"border") => borders.push(std::mem::take(&mut border)),
                (Section::Borders, _) => side = None,
                (Section::CellXfs, b"xf") => {
                    if let Some(entry) = xf.take() {
                        xfs.push(entry);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let styles = xfs
        .iter()
        .map(|x| Style {
            font: fonts.get(x.font_id).cloned().unwrap_or_default(),
            fill: fills.get(x.fill_id).cloned().unwrap_or_default(),
            border: borders.get(x.border_id).copied().unwrap_or_default(),
            number_format: number_format(&num_fmts, x.num_fmt_id),
            alignment: x.alignment,
            protection: x.protection,
        })
        .collect();

    StyleSheet {
        styles,
        xfs,
        fonts,
        font_xml,
        fills,
        borders,
        num_fmts,
    }
}

fn slice(xml: &str, start: usize, end: usize) -> String {
    xml.get(start..end).unwrap_or_default().trim().to_string()
}

pub(crate) fn number_format(num_fmts: &HashMap<u32, String>, id: u32) -> Option<NumberFormat> {
    match num_fmts.get(&id) {
        Some(code) => Some(NumberFormat::Custom(code.clone())),
        None if id == 0 => None,
        None => u8::try_from(id).ok().map(NumberFormat::Builtin),
    }
}

// =============================================================================
// ワークシートXML
// =============================================================================

/// ワークシートXMLから読み取るレイアウト情報
#[derive(Debug, Default)]
pub(crate) struct SheetLayout {
    /// (row, col, style_id)。style_id 0 は含めない
    pub cell_styles: Vec<(u32, u32, usize)>,
    pub col_widths: HashMap<u32, f64>,
    pub row_heights: HashMap<u32, f64>,
    pub merges: Vec<MergeRange>,
}

pub(crate) fn parse_sheet_layout(xml: &str) -> SheetLayout {
    let mut layout = SheetLayout::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"row" => {
                    let row: Option<u32> = attr_parse(e, b"r");
                    let height: Option<f64> = attr_parse(e, b"ht");
                    if attr_flag(e, b"customHeight", false) {
                        if let (Some(row), Some(height)) = (row, height) {
                            layout.row_heights.insert(row, height);
                        }
                    }
                }
                b"c" => {
                    let style_id: usize = attr_parse(e, b"s").unwrap_or(0);
                    if style_id > 0 {
                        if let Some((row, col)) =
                            attr_string(e, b"r").as_deref().and_then(parse_cell_ref)
                        {
                            layout.cell_styles.push((row, col, style_id));
                        }
                    }
                }
                b"col" => {
                    let min: Option<u32> = attr_parse(e, b"min");
                    let max: Option<u32> = attr_parse(e, b"max");
                    let width: Option<f64> = attr_parse(e, b"width");
                    if attr_flag(e, b"customWidth", false) {
                        if let (Some(min), Some(max), Some(width)) = (min, max, width) {
                            // 末尾まで一括指定された列（max=16384）は展開しない
                            for col in min..=max.min(min + 255) {
                                layout.col_widths.insert(col, width);
                            }
                        }
                    }
                }
                b"mergeCell" => {
                    if let Some(range) = attr_string(e, b"ref").as_deref().and_then(parse_merge_ref) {
                        layout.merges.push(range);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    layout
}

// =============================================================================
// コメント
// =============================================================================

/// コメントXMLから (row, col, Note) を読む
pub(crate) fn parse_comments_xml(xml: &str) -> Vec<(u32, u32, Note)> {
    let mut notes = Vec::new();
    let mut authors: Vec<String> = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut in_author = false;
    let mut in_text = false;
    let mut in_phonetic = false;
    let mut current: Option<(u32, u32, usize)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"author" => {
                    in_author = true;
                    text.clear();
                }
                b"comment" => {
                    let cell = attr_string(e, b"ref").as_deref().and_then(parse_cell_ref);
                    let author_id: usize = attr_parse(e, b"authorId").unwrap_or(0);
                    current = cell.map(|(r, c)| (r, c, author_id));
                    text.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if current.is_some() && !in_phonetic => in_text = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_author || in_text => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(ref e)) if in_author || in_text => {
                text.push('&');
                text.push_str(&String::from_utf8_lossy(&**e));
                text.push(';');
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"author" => {
                    authors.push(unescape_xml(&text));
                    in_author = false;
                    text.clear();
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"comment" => {
                    if let Some((row, col, author_id)) = current.take() {
                        notes.push((
                            row,
                            col,
                            Note {
                                author: authors.get(author_id).cloned().unwrap_or_default(),
                                text: unescape_xml(&text),
                            },
                        ));
                    }
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    notes
}

// =============================================================================
// リレーション
// =============================================================================

/// .rels から (Id, Type, Target) を読む
pub(crate) fn parse_relationships(xml: &str) -> Vec<(String, String, String)> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr_string(e, b"Id"), attr_string(e, b"Target")) {
                    let kind = attr_string(e, b"Type").unwrap_or_default();
                    rels.push((id, kind, target));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    rels
}

/// 既存のIDと重ならない "rIdN"
pub(crate) fn next_relationship_id(rels: &[(String, String, String)], taken: usize) -> String {
    let max = rels
        .iter()
        .filter_map(|(id, _, _)| id.strip_prefix("rId").and_then(|n| n.parse::<usize>().ok()))
        .max()
        .unwrap_or(0);
    format!("rId{}", max + taken + 1)
}

/// workbook.xml から (シート名, r:id) を読む
pub(crate) fn parse_workbook_sheets(xml: &str) -> Vec<(String, String)> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                if let (Some(name), Some(rid)) = (attr_string(e, b"name"), attr_string(e, b"r:id")) {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    sheets
}

/// シート名 → ワークシートXMLのパス
pub(crate) fn worksheet_paths(workbook_xml: &str, rels_xml: &str) -> HashMap<String, String> {
    let targets: HashMap<String, String> = parse_relationships(rels_xml)
        .into_iter()
        .map(|(id, _, target)| (id, resolve_part("xl", &target)))
        .collect();

    parse_workbook_sheets(workbook_xml)
        .into_iter()
        .filter_map(|(name, rid)| targets.get(&rid).map(|path| (name, path.clone())))
        .collect()
}

/// ワークシートに紐づくコメントXMLのパス
pub(crate) fn comments_path(sheet_path: &str, sheet_rels_xml: &str) -> Option<String> {
    let base_dir = sheet_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    parse_relationships(sheet_rels_xml)
        .into_iter()
        .find(|(_, kind, _)| kind.ends_with("/comments"))
        .map(|(_, _, target)| resolve_part(base_dir, &target))
}
