//! メモリ上のワークブック
//!
//! セル座標は行・列とも 1 始まり。

use super::package::SourcePackage;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// RGB色（0xRRGGBB）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u32);

impl Rgb {
    /// "FFC6EFCE" / "C6EFCE" 形式（ARGB or RGB）を読む
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        let rgb = match hex.len() {
            8 => &hex[2..],
            6 => hex,
            _ => return None,
        };
        u32::from_str_radix(rgb, 16).ok().map(Rgb)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub size: Option<f64>,
    pub color: Option<Rgb>,
    pub name: Option<String>,
}

/// 塗りつぶし（単色パターンのみ保持）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BorderLine {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
    Hair,
}

impl BorderLine {
    pub fn from_xml(s: &str) -> Self {
        match s {
            "thin" => BorderLine::Thin,
            "medium" | "mediumDashed" | "mediumDashDot" | "mediumDashDotDot" => BorderLine::Medium,
            "thick" => BorderLine::Thick,
            "dashed" | "dashDot" | "dashDotDot" | "slantDashDot" => BorderLine::Dashed,
            "dotted" => BorderLine::Dotted,
            "double" => BorderLine::Double,
            "hair" => BorderLine::Hair,
            _ => BorderLine::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edge {
    pub line: BorderLine,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Border {
    pub left: Edge,
    pub right: Edge,
    pub top: Edge,
    pub bottom: Edge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HAlign {
    #[default]
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterAcross,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Center,
    #[default]
    Bottom,
    Justify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Alignment {
    pub horizontal: HAlign,
    pub vertical: VAlign,
    pub wrap_text: bool,
    pub indent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub locked: bool,
    pub hidden: bool,
}

impl Default for Protection {
    fn default() -> Self {
        Self {
            locked: true,
            hidden: false,
        }
    }
}

/// 表示形式
#[derive(Debug, Clone, PartialEq)]
pub enum NumberFormat {
    /// 組み込み書式ID（0 = General 以外）
    Builtin(u8),
    Custom(String),
}

/// セルスタイル（値型としてディープコピーされる）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    pub number_format: Option<NumberFormat>,
    pub alignment: Alignment,
    pub protection: Protection,
}

impl Style {
    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }
}

/// セルのメモ（コメント）
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// 数式（先頭の "=" なし）と、あればキャッシュ済みの結果
    Formula { formula: String, cached: Option<String> },
}

impl CellValue {
    /// 表示用テキスト（数式はキャッシュ値）
    pub fn display(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CellValue::Formula { cached, .. } => cached.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: Style,
    pub note: Option<Note>,
    /// 読み込み元の cellXfs インデックス。書き戻し時の派生元になる
    pub style_id: Option<u32>,
}

/// 結合範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

/// 読み込み後に加えた変更
///
/// セルは変更前の状態（なければ None）を初回変更時に記録する。
#[derive(Debug, Clone, Default)]
pub(crate) struct Edits {
    pub cells: BTreeMap<(u32, u32), Option<Cell>>,
    pub col_widths: BTreeSet<u32>,
    pub row_heights: BTreeSet<u32>,
    pub merges: bool,
}

impl Edits {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.col_widths.is_empty() && self.row_heights.is_empty() && !self.merges
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(u32, u32), Cell>,
    col_widths: BTreeMap<u32, f64>,
    row_heights: BTreeMap<u32, f64>,
    merges: Vec<MergeRange>,
    edits: Option<Edits>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// セルを取得（なければ空セルを作る）
    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        if let Some(edits) = self.edits.as_mut() {
            let cells = &self.cells;
            edits
                .cells
                .entry((row, col))
                .or_insert_with(|| cells.get(&(row, col)).cloned());
        }
        self.cells.entry((row, col)).or_default()
    }

    pub fn set_value(&mut self, row: u32, col: u32, value: CellValue) {
        self.cell_mut(row, col).value = value;
    }

    /// スタイル（元のスタイルIDごと）を別セルにコピーする。コピー元がなければ false
    pub fn copy_style(&mut self, from: (u32, u32), to: (u32, u32)) -> bool {
        let Some((style, style_id)) = self.cell(from.0, from.1).map(|c| (c.style.clone(), c.style_id))
        else {
            return false;
        };
        let target = self.cell_mut(to.0, to.1);
        target.style = style;
        target.style_id = style_id;
        true
    }

    /// 表示テキスト（前後空白は除去しない）
    pub fn text(&self, row: u32, col: u32) -> Option<String> {
        self.cell(row, col).and_then(|c| c.value.display())
    }

    /// 前後空白を除いた表示テキスト。空なら None
    pub fn trimmed_text(&self, row: u32, col: u32) -> Option<String> {
        self.text(row, col)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// 値・スタイル・メモのいずれかを持つセルの最大行
    pub fn max_row(&self) -> u32 {
        self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0)
    }

    /// 値・スタイル・メモのいずれかを持つセルの最大列
    pub fn max_col(&self) -> u32 {
        self.cells.keys().map(|(_, c)| *c).max().unwrap_or(0)
    }

    /// 行番号順・列番号順で全セルを返す
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, &Cell)> {
        self.cells.iter().map(|((r, c), cell)| (*r, *c, cell))
    }

    /// 指定行の 1..=max_col のヘッダー値
    pub fn row_values(&self, row: u32) -> Vec<Option<String>> {
        (1..=self.max_col())
            .map(|col| self.trimmed_text(row, col))
            .collect()
    }

    /// 列幅（文字数単位）
    pub fn col_width(&self, col: u32) -> Option<f64> {
        self.col_widths.get(&col).copied()
    }

    pub fn set_col_width(&mut self, col: u32, width: f64) {
        self.col_widths.insert(col, width);
        if let Some(edits) = self.edits.as_mut() {
            edits.col_widths.insert(col);
        }
    }

    pub fn col_widths(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.col_widths.iter().map(|(c, w)| (*c, *w))
    }

    /// 行高（ポイント）
    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.row_heights.insert(row, height);
        if let Some(edits) = self.edits.as_mut() {
            edits.row_heights.insert(row);
        }
    }

    pub fn row_heights(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.row_heights.iter().map(|(r, h)| (*r, *h))
    }

    pub fn merges(&self) -> &[MergeRange] {
        &self.merges
    }

    pub fn add_merge(&mut self, range: MergeRange) {
        self.merges.push(range);
        if let Some(edits) = self.edits.as_mut() {
            edits.merges = true;
        }
    }

    /// ここから先の変更を記録する（読み込み完了時に呼ぶ）
    pub(crate) fn track_edits(&mut self) {
        self.edits = Some(Edits::default());
    }

    pub(crate) fn edits(&self) -> Option<&Edits> {
        self.edits.as_ref()
    }

    /// 変更前と内容が変わったセル: (行, 列, 変更前, 変更後)
    pub(crate) fn changed_cells(&self) -> Vec<(u32, u32, Option<&Cell>, Option<&Cell>)> {
        let Some(edits) = &self.edits else {
            return Vec::new();
        };
        edits
            .cells
            .iter()
            .filter_map(|(&(row, col), original)| {
                let current = self.cells.get(&(row, col));
                (original.as_ref() != current).then_some((row, col, original.as_ref(), current))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    /// 読み込み元のパッケージ。あれば保存時に差分だけを書き戻す
    pub(crate) source: Option<Arc<SourcePackage>>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self {
            sheets,
            source: None,
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_hex() {
        assert_eq!(Rgb::from_hex("FFC6EFCE"), Some(Rgb(0xC6EFCE)));
        assert_eq!(Rgb::from_hex("9C0006"), Some(Rgb(0x9C0006)));
        assert_eq!(Rgb::from_hex("xyz"), None);
    }

    #[test]
    fn test_display_values() {
        assert_eq!(CellValue::Number(3.0).display().as_deref(), Some("3"));
        assert_eq!(CellValue::Number(2.5).display().as_deref(), Some("2.5"));
        assert_eq!(CellValue::Empty.display(), None);
        let formula = CellValue::Formula {
            formula: "COUNTIF(D2:D9,\"Yes\")".into(),
            cached: Some("4".into()),
        };
        assert_eq!(formula.display().as_deref(), Some("4"));
    }

    #[test]
    fn test_sheet_extent() {
        let mut sheet = Sheet::new("Comparison");
        sheet.set_value(1, 4, CellValue::Text("Acme".into()));
        sheet.cell_mut(9, 6).style.fill.color = Some(Rgb(0xFFFFFF));

        assert_eq!(sheet.max_col(), 6);
        assert_eq!(sheet.max_row(), 9);
        assert_eq!(sheet.trimmed_text(1, 4).as_deref(), Some("Acme"));
    }

    #[test]
    fn test_changed_cells_after_tracking() {
        let mut sheet = Sheet::new("Comparison");
        sheet.set_value(2, 4, CellValue::Text("Yes".into()));
        sheet.set_value(3, 4, CellValue::Text("No".into()));
        sheet.track_edits();

        // 同じ値の再書き込みは変更にならない
        sheet.set_value(2, 4, CellValue::Text("Yes".into()));
        sheet.set_value(3, 4, CellValue::Text("Unsure".into()));
        sheet.set_value(4, 5, CellValue::Text("Agents".into()));
        sheet.set_col_width(5, 30.0);

        let changed: Vec<(u32, u32)> = sheet.changed_cells().iter().map(|(r, c, ..)| (*r, *c)).collect();
        assert_eq!(changed, vec![(3, 4), (4, 5)]);

        let (_, _, before, after) = sheet.changed_cells()[1];
        assert!(before.is_none());
        assert_eq!(after.map(|c| &c.value), Some(&CellValue::Text("Agents".into())));

        let edits = sheet.edits().unwrap();
        assert!(edits.col_widths.contains(&5));
        assert!(!edits.merges);
    }

    #[test]
    fn test_copy_style_carries_style_id() {
        let mut sheet = Sheet::new("Comparison");
        let source = sheet.cell_mut(1, 4);
        source.style.font.bold = true;
        source.style_id = Some(3);

        assert!(sheet.copy_style((1, 4), (1, 5)));
        assert!(!sheet.copy_style((1, 9), (1, 6)));

        let copied = sheet.cell(1, 5).unwrap();
        assert!(copied.style.font.bold);
        assert_eq!(copied.style_id, Some(3));
        assert!(sheet.cell(1, 6).is_none());
    }
}
