//! マスタExcelのメモリ上表現と xlsx 入出力
//!
//! 読み込んだブックは編集した部分だけを元の xlsx に書き戻すので、
//! ウィンドウ枠・ハイパーリンク・条件付き書式・入力規則・テーマ色もそのまま残る。

pub mod model;
mod notes;
mod ooxml;
mod package;
mod reader;
mod sheet_patch;
mod style_table;
mod writer;

pub use model::{
    Alignment, Border, BorderLine, Cell, CellValue, Edge, Fill, Font, HAlign, MergeRange, Note,
    NumberFormat, Protection, Rgb, Sheet, Style, VAlign, Workbook,
};
pub use reader::{load_workbook, load_workbook_file};
pub use writer::save_workbook;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workbook {
        let mut sheet = Sheet::new("Comparison");
        sheet.set_value(1, 2, CellValue::Text("Topic".into()));
        sheet.set_value(1, 4, CellValue::Text("GenAI by Acme".into()));
        sheet.set_value(2, 2, CellValue::Text("Prompt Engineering".into()));
        sheet.set_value(2, 4, CellValue::Text("Yes".into()));
        sheet.set_value(3, 3, CellValue::Number(42.0));
        sheet.set_value(
            4,
            3,
            CellValue::Formula {
                formula: "C3*2".into(),
                cached: Some("84".into()),
            },
        );

        let cell = sheet.cell_mut(2, 4);
        cell.style.fill.color = Some(Rgb(0xC6EFCE));
        cell.style.font.color = Some(Rgb(0x006100));
        cell.style.font.bold = true;
        cell.style.border.bottom = Edge {
            line: BorderLine::Thin,
            color: Some(Rgb(0x000000)),
        };
        cell.style.alignment.wrap_text = true;
        cell.note = Some(Note {
            author: "AgenticAI".into(),
            text: "Module 2 covers prompting & evaluation".into(),
        });

        sheet.set_col_width(4, 32.0);
        sheet.set_row_height(2, 45.0);
        sheet.add_merge(MergeRange {
            first_row: 10,
            first_col: 1,
            last_row: 10,
            last_col: 3,
        });
        sheet.set_value(10, 1, CellValue::Text("TOPIC END".into()));

        Workbook::new(vec![sheet, Sheet::new("Price, Duration, Projects")])
    }

    #[test]
    fn test_save_and_load_preserves_workbook() {
        let bytes = save_workbook(&sample()).expect("save");
        let loaded = load_workbook(&bytes).expect("load");

        assert_eq!(loaded.sheet_names(), vec!["Comparison", "Price, Duration, Projects"]);
        let sheet = loaded.sheet("Comparison").expect("sheet");

        assert_eq!(sheet.trimmed_text(1, 4).as_deref(), Some("GenAI by Acme"));
        assert_eq!(sheet.trimmed_text(3, 3).as_deref(), Some("42"));

        let cell = sheet.cell(2, 4).expect("cell");
        assert_eq!(cell.value, CellValue::Text("Yes".into()));
        assert_eq!(cell.style.fill.color, Some(Rgb(0xC6EFCE)));
        assert_eq!(cell.style.font.color, Some(Rgb(0x006100)));
        assert!(cell.style.font.bold);
        assert!(cell.style.alignment.wrap_text);
        assert_eq!(cell.style.border.bottom.line, BorderLine::Thin);

        let note = cell.note.as_ref().expect("note");
        assert_eq!(note.author, "AgenticAI");
        assert_eq!(note.text, "Module 2 covers prompting & evaluation");

        match &sheet.cell(4, 3).expect("formula").value {
            CellValue::Formula { formula, .. } => assert_eq!(formula, "C3*2"),
            other => panic!("expected formula, got {:?}", other),
        }

        assert_eq!(sheet.col_width(4), Some(32.0));
        assert_eq!(sheet.row_height(2), Some(45.0));
        assert_eq!(sheet.merges().len(), 1);
        assert_eq!(sheet.trimmed_text(10, 1).as_deref(), Some("TOPIC END"));
    }

    #[test]
    fn test_edit_loaded_workbook_patches_package() {
        let bytes = save_workbook(&sample()).expect("save");
        let mut loaded = load_workbook(&bytes).expect("load");

        let sheet = loaded.sheet_mut("Comparison").expect("sheet");
        sheet.copy_style((2, 4), (2, 5));
        sheet.set_value(1, 5, CellValue::Text("GenAI by Globex".into()));
        sheet.set_value(2, 5, CellValue::Text("Unsure".into()));
        let cell = sheet.cell_mut(2, 5);
        cell.style.fill.color = Some(Rgb(0xFFEB9C));
        cell.style.font.color = Some(Rgb(0x9C5700));
        cell.note = Some(Note {
            author: "AgenticAI".into(),
            text: "Only mentioned in the FAQ".into(),
        });
        sheet.cell_mut(2, 4).note = None;
        sheet.set_col_width(5, 30.0);
        sheet.set_row_height(3, 28.0);

        let patched = save_workbook(&loaded).expect("save patched");
        let reloaded = load_workbook(&patched).expect("reload");
        let sheet = reloaded.sheet("Comparison").expect("sheet");

        assert_eq!(sheet.trimmed_text(1, 5).as_deref(), Some("GenAI by Globex"));
        let cell = sheet.cell(2, 5).expect("cell");
        assert_eq!(cell.value, CellValue::Text("Unsure".into()));
        assert_eq!(cell.style.fill.color, Some(Rgb(0xFFEB9C)));
        assert_eq!(cell.style.font.color, Some(Rgb(0x9C5700)));
        assert!(cell.style.font.bold);
        assert_eq!(cell.style.border.bottom.line, BorderLine::Thin);
        assert_eq!(cell.note.as_ref().map(|n| n.text.as_str()), Some("Only mentioned in the FAQ"));

        // 触っていないセルはそのまま
        let original = sheet.cell(2, 4).expect("original");
        assert_eq!(original.style.fill.color, Some(Rgb(0xC6EFCE)));
        assert!(original.note.is_none());
        match &sheet.cell(4, 3).expect("formula").value {
            CellValue::Formula { formula, .. } => assert_eq!(formula, "C3*2"),
            other => panic!("expected formula, got {:?}", other),
        }

        assert_eq!(sheet.col_width(4), Some(32.0));
        assert_eq!(sheet.col_width(5), Some(30.0));
        assert_eq!(sheet.row_height(3), Some(28.0));
        assert_eq!(sheet.merges().len(), 1);
    }

    #[test]
    fn test_unchanged_workbook_is_copied_through() {
        let bytes = save_workbook(&sample()).expect("save");
        let loaded = load_workbook(&bytes).expect("load");

        let copied = save_workbook(&loaded).expect("save unchanged");
        let reloaded = load_workbook(&copied).expect("reload");
        assert_eq!(reloaded.sheet_names(), loaded.sheet_names());
        assert_eq!(
            reloaded.sheet("Comparison").and_then(|s| s.trimmed_text(10, 1)).as_deref(),
            Some("TOPIC END")
        );
    }

    #[test]
    fn test_load_rejects_non_xlsx() {
        let err = load_workbook(b"not a zip file").unwrap_err();
        assert!(matches!(err, crate::error::AppError::Workbook(_)));
    }
}
