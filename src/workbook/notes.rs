//! メモ（コメントXMLとVML描画）の差分書き換え

use super::model::Note;
use super::ooxml::{attr_string, cell_ref, parse_cell_ref, unescape_xml};
use crate::error::{AppError, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};

/// (行, 列) → 新しいメモ。None はメモを消す
pub(crate) type NoteChanges = BTreeMap<(u32, u32), Option<Note>>;

const EMPTY_COMMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><authors/><commentList/></comments>"#;

fn xml_err(part: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Workbook(format!("Failed to parse {}: {}", part, e))
}

fn comment_xml(row: u32, col: u32, author_id: usize, text: &str) -> String {
    format!(
        "<comment ref=\"{}\" authorId=\"{}\"><text><t xml:space=\"preserve\">{}</t></text></comment>",
        cell_ref(row, col),
        author_id,
        escape(text)
    )
}

/// 新しいコメントXML
pub(crate) fn new_comments_xml(changes: &NoteChanges) -> Result<String> {
    patch_comments_xml(EMPTY_COMMENTS, changes)
}

/// コメントXMLを書き換える
///
/// 変更・削除したセルの `<comment>` を取り除き、新しいメモを末尾に足す。
/// 足りない作成者は authors に追加する。
pub(crate) fn patch_comments_xml(xml: &str, changes: &NoteChanges) -> Result<String> {
    let mut out = String::with_capacity(xml.len() + 512);
    let mut reader = Reader::from_str(xml);
    let mut authors: Vec<String> = Vec::new();
    let mut author: Option<String> = None;
    let mut skip: Option<usize> = None;
    let mut depth = 0usize;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| xml_err("comments", e))?;
        let raw = &xml[before..reader.buffer_position() as usize];

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
                match e.local_name().as_ref() {
                    b"author" if !is_empty => {
                        author = Some(String::new());
                        out.push_str(raw);
                    }
                    b"authors" if is_empty => {
                        out.push_str("<authors>");
                        out.push_str(&new_authors(&mut authors, changes));
                        out.push_str("</authors>");
                    }
                    b"comment" => {
                        let cell = attr_string(e, b"ref").as_deref().and_then(parse_cell_ref);
                        if cell.is_some_and(|c| changes.contains_key(&c)) {
                            if !is_empty {
                                skip = Some(depth);
                            }
                        } else {
                            out.push_str(raw);
                        }
                    }
                    b"commentList" if is_empty => {
                        out.push_str("<commentList>");
                        out.push_str(&new_comments(&authors, changes));
                        out.push_str("</commentList>");
                    }
                    _ => out.push_str(raw),
                }
                if !is_empty {
                    depth += 1;
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"author" => {
                        if let Some(name) = author.take() {
                            authors.push(unescape_xml(&name));
                        }
                    }
                    b"authors" => out.push_str(&new_authors(&mut authors, changes)),
                    b"commentList" => out.push_str(&new_comments(&authors, changes)),
                    _ => {}
                }
                out.push_str(raw);
            }
            _ => {
                if let Some(name) = author.as_mut() {
                    name.push_str(raw);
                }
                out.push_str(raw);
            }
        }
    }

    Ok(out)
}

/// まだ登録されていない作成者を追加し、その `<author>` 要素を返す
fn new_authors(authors: &mut Vec<String>, changes: &NoteChanges) -> String {
    let mut xml = String::new();
    for note in changes.values().flatten() {
        if !authors.contains(&note.author) {
            xml.push_str(&format!("<author>{}</author>", escape(note.author.as_str())));
            authors.push(note.author.clone());
        }
    }
    xml
}

fn new_comments(authors: &[String], changes: &NoteChanges) -> String {
    changes
        .iter()
        .filter_map(|(&(row, col), note)| {
            let note = note.as_ref()?;
            let author_id = authors.iter().position(|a| *a == note.author).unwrap_or(0);
            Some(comment_xml(row, col, author_id, &note.text))
        })
        .collect()
}

// =============================================================================
// VML
// =============================================================================

const SHAPE_PREFIX: &str = "_x0000_s";

/// メモの吹き出し図形（行・列は 0 始まりで書く）
fn shape_xml(id: u32, z_index: usize, row: u32, col: u32) -> String {
    let (row, col) = (row - 1, col - 1);
    let top = row.saturating_sub(1);
    format!(
        concat!(
            "<v:shape id=\"{prefix}{id}\" type=\"#_x0000_t202\" ",
            "style=\"position:absolute;margin-left:59.25pt;margin-top:1.5pt;width:108pt;height:59.25pt;z-index:{z};visibility:hidden\" ",
            "fillcolor=\"#ffffe1\" o:insetmode=\"auto\">",
            "<v:fill color2=\"#ffffe1\"/><v:shadow on=\"t\" color=\"black\" obscured=\"t\"/>",
            "<v:path o:connecttype=\"none\"/>",
            "<v:textbox style=\"mso-direction-alt:auto\"><div style=\"text-align:left\"></div></v:textbox>",
            "<x:ClientData ObjectType=\"Note\"><x:MoveWithCells/><x:SizeWithCells/>",
            "<x:Anchor>{left}, 15, {top}, 10, {right}, 15, {bottom}, 4</x:Anchor>",
            "<x:AutoFill>False</x:AutoFill><x:Row>{row}</x:Row><x:Column>{col}</x:Column>",
            "</x:ClientData></v:shape>"
        ),
        prefix = SHAPE_PREFIX,
        id = id,
        z = z_index,
        left = col + 1,
        top = top,
        right = col + 3,
        bottom = top + 4,
        row = row,
        col = col,
    )
}

/// 新しいVML描画。図形IDは `block` * 1024 から振る
pub(crate) fn new_vml(block: u32, added: &[(u32, u32)]) -> String {
    let shapes: String = added
        .iter()
        .enumerate()
        .map(|(i, &(row, col))| shape_xml(block * 1024 + i as u32 + 1, i + 1, row, col))
        .collect();
    format!(
        concat!(
            "<xml xmlns:v=\"urn:schemas-microsoft-com:vml\" xmlns:o=\"urn:schemas-microsoft-com:office:office\" ",
            "xmlns:x=\"urn:schemas-microsoft-com:office:excel\">",
            "<o:shapelayout v:ext=\"edit\"><o:idmap v:ext=\"edit\" data=\"{}\"/></o:shapelayout>",
            "<v:shapetype id=\"_x0000_t202\" coordsize=\"21600,21600\" o:spt=\"202\" path=\"m,l,21600r21600,l21600,xe\">",
            "<v:stroke joinstyle=\"miter\"/><v:path gradientshapeok=\"t\" o:connecttype=\"rect\"/></v:shapetype>",
            "{}</xml>"
        ),
        block, shapes
    )
}

/// o:idmap の data に並ぶブロック番号
pub(crate) fn vml_blocks(xml: &str) -> Vec<u32> {
    xml.match_indices("<o:idmap")
        .filter_map(|(i, _)| {
            let rest = &xml[i..];
            let rest = &rest[rest.find("data=")? + 6..];
            rest.get(..rest.find(|c| c == '"' || c == '\'')?)
        })
        .flat_map(|data| data.split(',').filter_map(|n| n.trim().parse().ok()).collect::<Vec<u32>>())
        .collect()
}

fn max_shape_id(xml: &str) -> u32 {
    xml.match_indices(SHAPE_PREFIX)
        .filter_map(|(i, m)| {
            let digits: String = xml[i + m.len()..].chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .max()
        .unwrap_or(0)
}

/// 吹き出し図形を書き換える
///
/// 消したメモの図形を取り除き、新しいメモの図形を末尾に足す。
/// 文字だけ変わったメモの図形はそのまま残す。
pub(crate) fn patch_vml(xml: &str, added: &[(u32, u32)], removed: &BTreeSet<(u32, u32)>) -> Result<String> {
    let mut out = String::with_capacity(xml.len() + 1024 * added.len());
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    // (図形XML, 行, 列)
    let mut shape: Option<(String, Option<u32>, Option<u32>)> = None;
    let mut field: Option<bool> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| xml_err("VML drawing", e))?;
        let raw = &xml[before..reader.buffer_position() as usize];

        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"v:shape" && shape.is_none() => {
                shape = Some((raw.to_string(), None, None));
                continue;
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"Row" => field = Some(true),
                b"Column" => field = Some(false),
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(is_row), Some((_, row, col))) = (field, shape.as_mut()) {
                    let value = String::from_utf8_lossy(t).trim().parse().ok();
                    if is_row {
                        *row = value;
                    } else {
                        *col = value;
                    }
                }
            }
            Event::End(e) => {
                field = None;
                if e.name().as_ref() == b"v:shape" {
                    if let Some((mut xml, row, col)) = shape.take() {
                        xml.push_str(raw);
                        let cell = row.zip(col).map(|(r, c)| (r + 1, c + 1));
                        if !cell.is_some_and(|c| removed.contains(&c)) {
                            out.push_str(&xml);
                        }
                        continue;
                    }
                }
            }
            _ => {}
        }

        match shape.as_mut() {
            Some((xml, ..)) => xml.push_str(raw),
            None => out.push_str(raw),
        }
    }

    if added.is_empty() {
        return Ok(out);
    }

    let first_id = max_shape_id(xml) + 1;
    let shapes: String = added
        .iter()
        .enumerate()
        .map(|(i, &(row, col))| shape_xml(first_id + i as u32, i + 1, row, col))
        .collect();
    match out.rfind("</xml>") {
        Some(end) => out.insert_str(end, &shapes),
        None => out.push_str(&shapes),
    }
    Ok(out)
}
