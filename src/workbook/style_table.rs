//! 書き戻し用のセルスタイル表
//!
//! 読み込んだ styles.xml の xf をそのまま使い、変わったスタイルだけ
//! 部品（フォント・塗り・罫線・表示形式）を追加して新しい xf を作る。

use super::model::{Border, BorderLine, Edge, Fill, Font, HAlign, NumberFormat, Rgb, Style, VAlign};
use super::ooxml::{start_tag, StyleSheet, XfEntry};
use crate::error::{AppError, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

/// ユーザー定義の表示形式IDはこれより後ろから振る
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// 追加した部品のXMLと重複排除用の索引
#[derive(Default)]
struct Additions {
    xml: Vec<String>,
    index: HashMap<String, usize>,
}

impl Additions {
    /// 同じXMLがあればそのID、なければ追加して offset + 位置
    fn intern(&mut self, xml: String, offset: usize) -> usize {
        if let Some(&id) = self.index.get(&xml) {
            return id;
        }
        let id = offset + self.xml.len();
        self.index.insert(xml.clone(), id);
        self.xml.push(xml);
        id
    }
}

pub(crate) struct StyleRegistry<'a> {
    sheet: &'a StyleSheet,
    fonts: Additions,
    fills: Additions,
    borders: Additions,
    xfs: Additions,
    num_fmts: Vec<(u32, String)>,
}

impl<'a> StyleRegistry<'a> {
    pub fn new(sheet: &'a StyleSheet) -> Self {
        Self {
            sheet,
            fonts: Additions::default(),
            fills: Additions::default(),
            borders: Additions::default(),
            xfs: Additions::default(),
            num_fmts: Vec::new(),
        }
    }

    pub fn has_additions(&self) -> bool {
        !self.xfs.xml.is_empty()
    }

    /// セルのスタイル → cellXfs のインデックス
    ///
    /// 読み込み時のスタイルから変わっていなければ元のIDを返す。
    /// 変わっていれば元の xf を土台に、違う部品だけ差し替えた xf を作る。
    pub fn resolve(&mut self, style: &Style, style_id: Option<u32>) -> u32 {
        match style_id {
            Some(id) if self.sheet.styles.get(id as usize) == Some(style) => return id,
            None if style.is_default() => return 0,
            _ => {}
        }

        let inherit = style_id.is_some();
        let base = self
            .sheet
            .xfs
            .get(style_id.unwrap_or(0) as usize)
            .copied()
            .unwrap_or_default();

        let font_id = self.font_id(&style.font, base.font_id, inherit);
        let fill_id = if self.sheet.fills.get(base.fill_id) == Some(&style.fill)
            || (!inherit && style.fill == Fill::default())
        {
            base.fill_id
        } else {
            self.fills.intern(fill_xml(&style.fill), self.sheet.fills.len())
        };
        let border_id = if self.sheet.borders.get(base.border_id) == Some(&style.border)
            || (!inherit && style.border == Border::default())
        {
            base.border_id
        } else {
            self.borders.intern(border_xml(&style.border), self.sheet.borders.len())
        };
        let num_fmt_id = self.num_fmt_id(style.number_format.as_ref());

        let xf = xf_xml(
            &XfEntry {
                num_fmt_id,
                font_id,
                fill_id,
                border_id,
                xf_id: base.xf_id,
                alignment: style.alignment,
                protection: style.protection,
            },
        );
        self.xfs.intern(xf, self.sheet.xfs.len()) as u32
    }

    fn font_id(&mut self, font: &Font, base_id: usize, inherit: bool) -> usize {
        let base = self.sheet.fonts.get(base_id);
        if base == Some(font) || (!inherit && *font == Font::default()) {
            return base_id;
        }

        // 色だけが違うなら元のXMLの color を差し替える（テーマ・ファミリー等を残す）
        let raw = self.sheet.font_xml.get(base_id).map(String::as_str).unwrap_or_default();
        let only_color = base.is_some_and(|b| Font { color: font.color, ..b.clone() } == *font);
        let xml = match only_color.then(|| with_font_color(raw, font.color)).flatten() {
            Some(xml) => xml,
            None => font_xml(font, base),
        };
        self.fonts.intern(xml, self.sheet.fonts.len())
    }

    fn num_fmt_id(&mut self, format: Option<&NumberFormat>) -> u32 {
        let code = match format {
            None => return 0,
            Some(NumberFormat::Builtin(id)) => return u32::from(*id),
            Some(NumberFormat::Custom(code)) => code,
        };

        let existing = self
            .sheet
            .num_fmts
            .iter()
            .map(|(id, c)| (*id, c))
            .chain(self.num_fmts.iter().map(|(id, c)| (*id, c)))
            .find(|(_, c)| *c == code)
            .map(|(id, _)| id);
        if let Some(id) = existing {
            return id;
        }

        let id = self
            .sheet
            .num_fmts
            .keys()
            .chain(self.num_fmts.iter().map(|(id, _)| id))
            .copied()
            .max()
            .map_or(FIRST_CUSTOM_NUM_FMT, |max| (max + 1).max(FIRST_CUSTOM_NUM_FMT));
        self.num_fmts.push((id, code.clone()));
        id
    }
}

fn argb(color: Rgb) -> String {
    format!("FF{:06X}", color.0)
}

/// フォントXMLの color 要素を差し替える。色がなければ取り除く
fn with_font_color(raw: &str, color: Option<Rgb>) -> Option<String> {
    let color_xml = color
        .map(|c| format!("<color rgb=\"{}\"/>", argb(c)))
        .unwrap_or_default();

    if let Some(start) = raw.find("<color") {
        let end = start + raw[start..].find("/>")? + 2;
        return Some(format!("{}{}{}", &raw[..start], color_xml, &raw[end..]));
    }
    if let Some(end) = raw.rfind("</font>") {
        return Some(format!("{}{}{}", &raw[..end], color_xml, &raw[end..]));
    }
    raw.starts_with("<font")
        .then(|| format!("{}>{}</font>", raw.trim_end_matches("/>"), color_xml))
}

fn font_xml(font: &Font, base: Option<&Font>) -> String {
    let mut xml = String::from("<font>");
    if font.bold {
        xml.push_str("<b/>");
    }
    if font.italic {
        xml.push_str("<i/>");
    }
    if font.strikethrough {
        xml.push_str("<strike/>");
    }
    if font.underline {
        xml.push_str("<u/>");
    }
    if let Some(size) = font.size.or(base.and_then(|b| b.size)) {
        xml.push_str(&format!("<sz val=\"{}\"/>", size));
    }
    if let Some(color) = font.color {
        xml.push_str(&format!("<color rgb=\"{}\"/>", argb(color)));
    }
    if let Some(name) = font.name.as_ref().or(base.and_then(|b| b.name.as_ref())) {
        xml.push_str(&format!("<name val=\"{}\"/>", escape(name.as_str())));
    }
    xml.push_str("</font>");
    xml
}

fn fill_xml(fill: &Fill) -> String {
    match fill.color {
        Some(color) => format!(
            "<fill><patternFill patternType=\"solid\"><fgColor rgb=\"{}\"/><bgColor indexed=\"64\"/></patternFill></fill>",
            argb(color)
        ),
        None => "<fill><patternFill patternType=\"none\"/></fill>".to_string(),
    }
}

fn border_line(line: BorderLine) -> &'static str {
    match line {
        BorderLine::None => "",
        BorderLine::Thin => "thin",
        BorderLine::Medium => "medium",
        BorderLine::Thick => "thick",
        BorderLine::Dashed => "dashed",
        BorderLine::Dotted => "dotted",
        BorderLine::Double => "double",
        BorderLine::Hair => "hair",
    }
}

fn edge_xml(name: &str, edge: &Edge) -> String {
    if edge.line == BorderLine::None {
        return format!("<{}/>", name);
    }
    let color = edge
        .color
        .map(|c| format!("<color rgb=\"{}\"/>", argb(c)))
        .unwrap_or_else(|| "<color auto=\"1\"/>".to_string());
    format!("<{0} style=\"{1}\">{2}</{0}>", name, border_line(edge.line), color)
}

fn border_xml(border: &Border) -> String {
    format!(
        "<border>{}{}{}{}<diagonal/></border>",
        edge_xml("left", &border.left),
        edge_xml("right", &border.right),
        edge_xml("top", &border.top),
        edge_xml("bottom", &border.bottom)
    )
}

fn xf_xml(xf: &XfEntry) -> String {
    let mut attrs = format!(
        "numFmtId=\"{}\" fontId=\"{}\" fillId=\"{}\" borderId=\"{}\" xfId=\"{}\"",
        xf.num_fmt_id, xf.font_id, xf.fill_id, xf.border_id, xf.xf_id
    );
    for (flag, on) in [
        ("applyNumberFormat", xf.num_fmt_id != 0),
        ("applyFont", xf.font_id != 0),
        ("applyFill", xf.fill_id != 0),
        ("applyBorder", xf.border_id != 0),
    ] {
        if on {
            attrs.push_str(&format!(" {}=\"1\"", flag));
        }
    }

    let mut children = String::new();
    let alignment = &xf.alignment;
    if *alignment != Default::default() {
        attrs.push_str(" applyAlignment=\"1\"");
        children.push_str("<alignment");
        let horizontal = match alignment.horizontal {
            HAlign::General => None,
            HAlign::Left => Some("left"),
            HAlign::Center => Some("center"),
            HAlign::Right => Some("right"),
            HAlign::Fill => Some("fill"),
            HAlign::Justify => Some("justify"),
            HAlign::CenterAcross => Some("centerContinuous"),
        };
        if let Some(h) = horizontal {
            children.push_str(&format!(" horizontal=\"{}\"", h));
        }
        let vertical = match alignment.vertical {
            VAlign::Top => Some("top"),
            VAlign::Center => Some("center"),
            VAlign::Bottom => None,
            VAlign::Justify => Some("justify"),
        };
        if let Some(v) = vertical {
            children.push_str(&format!(" vertical=\"{}\"", v));
        }
        if alignment.wrap_text {
            children.push_str(" wrapText=\"1\"");
        }
        if alignment.indent > 0 {
            children.push_str(&format!(" indent=\"{}\"", alignment.indent));
        }
        children.push_str("/>");
    }
    if xf.protection != Default::default() {
        attrs.push_str(" applyProtection=\"1\"");
        children.push_str(&format!(
            "<protection locked=\"{}\" hidden=\"{}\"/>",
            u8::from(xf.protection.locked),
            u8::from(xf.protection.hidden)
        ));
    }

    if children.is_empty() {
        format!("<xf {}/>", attrs)
    } else {
        format!("<xf {}>{}</xf>", attrs, children)
    }
}

/// 追加分を styles.xml に書き足す。追加がなければ None
pub(crate) fn patch_styles_xml(xml: &str, registry: &StyleRegistry) -> Result<Option<String>> {
    if !registry.has_additions() {
        return Ok(None);
    }

    let sheet = registry.sheet;
    let num_fmts: Vec<String> = registry
        .num_fmts
        .iter()
        .map(|(id, code)| format!("<numFmt numFmtId=\"{}\" formatCode=\"{}\"/>", id, escape(code.as_str())))
        .collect();
    let sections: [(&str, &[String], usize); 5] = [
        ("numFmts", &num_fmts, sheet.num_fmts.len()),
        ("fonts", &registry.fonts.xml, sheet.fonts.len()),
        ("fills", &registry.fills.xml, sheet.fills.len()),
        ("borders", &registry.borders.xml, sheet.borders.len()),
        ("cellXfs", &registry.xfs.xml, sheet.xfs.len()),
    ];
    let section = |name: &[u8]| sections.iter().find(|(n, ..)| n.as_bytes() == name);

    let mut out = String::with_capacity(xml.len() + 1024);
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut has_num_fmts = false;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| AppError::Workbook(format!("Failed to parse styles.xml: {}", e)))?;
        let raw = &xml[before..reader.buffer_position() as usize];

        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) if depth == 1 => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = e.local_name();
                if name.as_ref() == b"numFmts" {
                    has_num_fmts = true;
                }
                // numFmts は fonts より前に置く
                if name.as_ref() == b"fonts" && !has_num_fmts && !num_fmts.is_empty() {
                    out.push_str(&format!(
                        "<numFmts count=\"{}\">{}</numFmts>",
                        num_fmts.len(),
                        num_fmts.concat()
                    ));
                }

                match section(name.as_ref()) {
                    Some((_, added, existing)) if !added.is_empty() => {
                        let count = vec![("count", (existing + added.len()).to_string())];
                        out.push_str(&start_tag(e, &count, &[], false));
                        if is_empty {
                            out.push_str(&added.concat());
                            out.push_str(&format!("</{}>", String::from_utf8_lossy(e.name().as_ref())));
                        }
                    }
                    _ => out.push_str(raw),
                }
                if !is_empty {
                    depth += 1;
                }
            }
            Event::Start(_) => {
                depth += 1;
                out.push_str(raw);
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some((_, added, _)) = section(e.local_name().as_ref()) {
                        out.push_str(&added.concat());
                    }
                }
                out.push_str(raw);
            }
            _ => out.push_str(raw),
        }
    }

    Ok(Some(out))
}
