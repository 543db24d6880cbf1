//! xlsx 書き出し
//!
//! 読み込んだブックは元のパッケージに差分を当てる。
//! 一から作ったブックは rust_xlsxwriter で書き出す。

use super::model::{BorderLine, CellValue, Edge, HAlign, NumberFormat, Style, VAlign, Workbook};
use super::package::save_patched;
use crate::error::{AppError, Result};
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, FormatUnderline, Formula, Note, Workbook as XlsxWorkbook,
    Worksheet, XlsxError,
};
use tracing::warn;

fn xlsx_err(e: XlsxError) -> AppError {
    AppError::Workbook(e.to_string())
}

/// ワークブックを xlsx のバイト列にする
pub fn save_workbook(workbook: &Workbook) -> Result<Vec<u8>> {
    match workbook.source.as_deref() {
        Some(source) if source.matches(workbook) => save_patched(workbook, source),
        Some(_) => {
            warn!("Sheets were added or renamed; rebuilding the workbook from scratch");
            build_workbook(workbook)
        }
        None => build_workbook(workbook),
    }
}

/// rust_xlsxwriter で一から書き出す
fn build_workbook(workbook: &Workbook) -> Result<Vec<u8>> {
    let mut xlsx = XlsxWorkbook::new();

    for sheet in &workbook.sheets {
        let worksheet = xlsx.add_worksheet().set_name(&sheet.name).map_err(xlsx_err)?;

        for (col, width) in sheet.col_widths() {
            worksheet.set_column_width(col_index(col)?, width).map_err(xlsx_err)?;
        }
        for (row, height) in sheet.row_heights() {
            worksheet.set_row_height(row - 1, height).map_err(xlsx_err)?;
        }

        // 結合を先に書く（merge_range は範囲内を空白で埋めるため、後からセルで上書きする）
        for merge in sheet.merges() {
            if merge.first_row == merge.last_row && merge.first_col == merge.last_col {
                continue;
            }
            let style = sheet
                .cell(merge.first_row, merge.first_col)
                .map(|c| c.style.clone())
                .unwrap_or_default();
            worksheet
                .merge_range(
                    merge.first_row - 1,
                    col_index(merge.first_col)?,
                    merge.last_row - 1,
                    col_index(merge.last_col)?,
                    "",
                    &build_format(&style),
                )
                .map_err(xlsx_err)?;
        }

        for (row, col, cell) in sheet.cells() {
            write_cell(worksheet, row - 1, col_index(col)?, &cell.value, &cell.style)?;
            if let Some(note) = &cell.note {
                let note = Note::new(&note.text)
                    .set_author(&note.author)
                    .add_author_prefix(false);
                worksheet.insert_note(row - 1, col_index(col)?, &note).map_err(xlsx_err)?;
            }
        }
    }

    xlsx.save_to_buffer().map_err(xlsx_err)
}

fn col_index(col: u32) -> Result<u16> {
    col.checked_sub(1)
        .and_then(|c| u16::try_from(c).ok())
        .ok_or_else(|| AppError::Workbook(format!("Column out of range: {}", col)))
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    style: &Style,
) -> Result<()> {
    let format = build_format(style);
    match value {
        CellValue::Empty => {
            if !style.is_default() {
                worksheet.write_blank(row, col, &format).map_err(xlsx_err)?;
            }
        }
        CellValue::Text(s) => {
            worksheet.write_string_with_format(row, col, s, &format).map_err(xlsx_err)?;
        }
        CellValue::Number(n) => {
            worksheet.write_number_with_format(row, col, *n, &format).map_err(xlsx_err)?;
        }
        CellValue::Bool(b) => {
            worksheet.write_boolean_with_format(row, col, *b, &format).map_err(xlsx_err)?;
        }
        CellValue::Formula { formula, cached } => {
            let mut formula = Formula::new(formula);
            if let Some(result) = cached {
                formula = formula.set_result(result);
            }
            worksheet.write_formula_with_format(row, col, formula, &format).map_err(xlsx_err)?;
        }
    }
    Ok(())
}

fn border_to_xlsx(line: BorderLine) -> FormatBorder {
    match line {
        BorderLine::None => FormatBorder::None,
        BorderLine::Thin => FormatBorder::Thin,
        BorderLine::Medium => FormatBorder::Medium,
        BorderLine::Thick => FormatBorder::Thick,
        BorderLine::Dashed => FormatBorder::Dashed,
        BorderLine::Dotted => FormatBorder::Dotted,
        BorderLine::Double => FormatBorder::Double,
        BorderLine::Hair => FormatBorder::Hair,
    }
}

/// 罫線が引かれている辺だけ (種類, 色) を返す
fn edge(edge: &Edge) -> Option<(FormatBorder, Option<Color>)> {
    (edge.line != BorderLine::None)
        .then(|| (border_to_xlsx(edge.line), edge.color.map(|c| Color::RGB(c.0))))
}

/// Style → rust_xlsxwriter の Format
pub(crate) fn build_format(style: &Style) -> Format {
    let mut format = Format::new();

    let font = &style.font;
    if font.bold {
        format = format.set_bold();
    }
    if font.italic {
        format = format.set_italic();
    }
    if font.underline {
        format = format.set_underline(FormatUnderline::Single);
    }
    if font.strikethrough {
        format = format.set_font_strikethrough();
    }
    if let Some(size) = font.size {
        format = format.set_font_size(size);
    }
    if let Some(color) = font.color {
        format = format.set_font_color(Color::RGB(color.0));
    }
    if let Some(name) = &font.name {
        format = format.set_font_name(name);
    }

    if let Some(color) = style.fill.color {
        format = format.set_background_color(Color::RGB(color.0));
    }

    let border = &style.border;
    if let Some((line, color)) = edge(&border.top) {
        format = format.set_border_top(line);
        if let Some(color) = color {
            format = format.set_border_top_color(color);
        }
    }
    if let Some((line, color)) = edge(&border.right) {
        format = format.set_border_right(line);
        if let Some(color) = color {
            format = format.set_border_right_color(color);
        }
    }
    if let Some((line, color)) = edge(&border.bottom) {
        format = format.set_border_bottom(line);
        if let Some(color) = color {
            format = format.set_border_bottom_color(color);
        }
    }
    if let Some((line, color)) = edge(&border.left) {
        format = format.set_border_left(line);
        if let Some(color) = color {
            format = format.set_border_left_color(color);
        }
    }

    match &style.number_format {
        Some(NumberFormat::Builtin(id)) => format = format.set_num_format_index(*id),
        Some(NumberFormat::Custom(code)) => format = format.set_num_format(code),
        None => {}
    }

    let alignment = &style.alignment;
    format = match alignment.horizontal {
        HAlign::General => format,
        HAlign::Left => format.set_align(FormatAlign::Left),
        HAlign::Center => format.set_align(FormatAlign::Center),
        HAlign::Right => format.set_align(FormatAlign::Right),
        HAlign::Fill => format.set_align(FormatAlign::Fill),
        HAlign::Justify => format.set_align(FormatAlign::Justify),
        HAlign::CenterAcross => format.set_align(FormatAlign::CenterAcross),
    };
    format = match alignment.vertical {
        VAlign::Top => format.set_align(FormatAlign::Top),
        VAlign::Center => format.set_align(FormatAlign::VerticalCenter),
        VAlign::Bottom => format,
        VAlign::Justify => format.set_align(FormatAlign::VerticalJustify),
    };
    if alignment.wrap_text {
        format = format.set_text_wrap();
    }
    if alignment.indent > 0 {
        format = format.set_indent(alignment.indent);
    }

    if !style.protection.locked {
        format = format.set_unlocked();
    }
    if style.protection.hidden {
        format = format.set_hidden();
    }

    format
}
