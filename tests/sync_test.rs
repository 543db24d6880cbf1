//! マスタExcel同期の統合テスト
//!
//! rust_xlsxwriter で作ったマスタを読み込み → 同期 → 書き出し → 再読み込みして確認する。

use competitor_iq::error::AppError;
use competitor_iq::sync::{self, CompetitorIdentity, COMPARISON_SHEET, PRICE_SHEET};
use competitor_iq::workbook::{load_workbook, BorderLine, CellValue, Rgb, Workbook};
use competitor_iq::writer::{update_document, RowOutcome, RowUpdate};
use competitor_iq_common::{reconcile, Decision, DecisionMap, FieldMap, TopicRecord, TopicVerdict};
use rust_xlsxwriter::{
    Color, ConditionalFormatCell, ConditionalFormatCellRule, DataValidation, Format, FormatBorder, Formula, Note,
    Workbook as XlsxWorkbook,
};
use std::io::{Cursor, Read};

const TOPICS: [&str; 4] = ["Prompt Engineering", "RAG", "Vector Databases", "Agents"];

/// テスト用マスタ
///
/// Comparison: B2〜B4 と B6 がトピック（B5 は空）、B7 が "TOPIC END"、8行目が集計行。
/// D列が既存の競合列（太字ヘッダー・罫線・列幅30・メモ）。
fn build_master(with_price_sheet: bool) -> Vec<u8> {
    let mut xlsx = XlsxWorkbook::new();
    let header = Format::new().set_bold().set_background_color(Color::RGB(0xD9E1F2));
    let bordered = Format::new().set_border(FormatBorder::Thin);

    {
        let sheet = xlsx.add_worksheet().set_name(COMPARISON_SHEET).unwrap();
        sheet.write_string(0, 0, "#").unwrap();
        sheet.write_string(0, 1, "Topic").unwrap();
        sheet.write_string(0, 2, "Our Course").unwrap();
        sheet.write_string_with_format(0, 3, "Bootcamp by Acme", &header).unwrap();

        let rows = [1u32, 2, 3, 5];
        for (topic, row) in TOPICS.iter().zip(rows) {
            sheet.write_string(row, 1, *topic).unwrap();
            sheet.write_string_with_format(row, 3, "Yes", &bordered).unwrap();
        }
        sheet.write_string(6, 1, "TOPIC END").unwrap();
        sheet.write_string(7, 1, "ESSENTIAL YES").unwrap();
        sheet
            .write_formula(7, 3, Formula::new("=COUNTIF(D2:D6,\"Yes\")").set_result("4"))
            .unwrap();
        sheet.merge_range(8, 0, 8, 2, "Summary", &Format::new()).unwrap();
        sheet.set_column_width(3, 30).unwrap();
        sheet
            .insert_note(
                1,
                3,
                &Note::new("Checked manually").set_author("Reviewer").add_author_prefix(false),
            )
            .unwrap();
    }

    if with_price_sheet {
        let sheet = xlsx.add_worksheet().set_name(PRICE_SHEET).unwrap();
        let headers = ["Provider", "Course Name", "Price", "Duration", "Price/Week", "Website Link"];
        for (col, name) in headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header).unwrap();
        }
        let shaded = Format::new().set_background_color(Color::RGB(0xF2F2F2));
        sheet.write_string_with_format(1, 0, "Initech", &shaded).unwrap();
        sheet.write_string_with_format(1, 1, "Data Science 101", &shaded).unwrap();
        sheet.write_string_with_format(1, 2, "$500", &shaded).unwrap();
        sheet.write_string_with_format(1, 3, "8 weeks", &shaded).unwrap();
        sheet.set_row_height(1, 24).unwrap();
    }

    xlsx.save_to_buffer().expect("マスタの生成に失敗")
}

fn decisions() -> DecisionMap {
    let records = vec![
        TopicRecord {
            topic: " prompt engineering ".into(),
            decision: "yes".into(),
            reasoning: "Module 1 is dedicated to prompting".into(),
        },
        TopicRecord {
            topic: "RAG".into(),
            decision: "Unsure".into(),
            reasoning: "Retrieval is mentioned once".into(),
        },
        TopicRecord {
            topic: "Quantum Computing".into(),
            decision: "Yes".into(),
            reasoning: "Not a canonical topic".into(),
        },
    ];
    let topics: Vec<String> = TOPICS.iter().map(|t| t.to_string()).collect();
    reconcile(&topics, &records).decisions
}

fn row_update() -> RowUpdate {
    let fields: FieldMap = [
        ("Price", "$999"),
        ("Duration", "6 months"),
        ("Price/Week", "$41.62"),
        ("Projects", "3"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    RowUpdate {
        identity: CompetitorIdentity::new("Acme", "GenAI Pro", "https://acme.example/genai"),
        fields,
    }
}

/// ウィンドウ枠固定・リンク・条件付き書式・入力規則・テーマ色を持つマスタ
fn build_decorated_master() -> Vec<u8> {
    let mut xlsx = XlsxWorkbook::new();
    let themed = Format::new().set_background_color(Color::Theme(4, 2));
    let highlight = Format::new().set_background_color(Color::RGB(0xC6EFCE));

    let sheet = xlsx.add_worksheet().set_name(COMPARISON_SHEET).unwrap();
    sheet.write_string_with_format(0, 0, "#", &themed).unwrap();
    sheet.write_string(0, 1, "Topic").unwrap();
    sheet.write_string(0, 3, "Bootcamp by Acme").unwrap();
    for (i, topic) in TOPICS.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 1, *topic).unwrap();
        sheet.write_string(row, 3, "Yes").unwrap();
    }
    sheet.write_string(5, 1, "TOPIC END").unwrap();
    sheet.write_url(6, 1, "https://acme.example/syllabus").unwrap();
    sheet.set_freeze_panes(1, 2).unwrap();

    let rule = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::EqualTo("\"Yes\""))
        .set_format(&highlight);
    sheet.add_conditional_format(1, 3, 4, 3, &rule).unwrap();
    let validation = DataValidation::new().allow_list_strings(&["Yes", "No", "Unsure"]).unwrap();
    sheet.add_data_validation(1, 3, 4, 3, &validation).unwrap();

    xlsx.save_to_buffer().expect("マスタの生成に失敗")
}

fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
    xml
}

fn reload(bytes: &[u8]) -> Workbook {
    load_workbook(bytes).expect("出力の再読み込みに失敗")
}

#[test]
fn test_new_column_inherits_reference_style() {
    let master = build_master(true);
    let update = update_document(&master, "GenAI Pro by Acme", &decisions(), None).unwrap();

    assert_eq!(update.column.column, 5);
    assert!(update.column.created);
    assert_eq!(update.column.reference_column, Some(4));
    assert_eq!(update.column.rows_written, 4);

    let workbook = reload(&update.bytes);
    let sheet = workbook.sheet(COMPARISON_SHEET).unwrap();

    let header = sheet.cell(1, 5).unwrap();
    assert_eq!(header.value, CellValue::Text("GenAI Pro by Acme".into()));
    assert!(header.style.font.bold);
    assert_eq!(header.style.fill.color, Some(Rgb(0xD9E1F2)));
    assert_eq!(sheet.col_width(5), Some(30.0));

    let yes = sheet.cell(2, 5).unwrap();
    assert_eq!(yes.value, CellValue::Text("Yes".into()));
    assert_eq!(yes.style.fill.color, Some(Rgb(0xC6EFCE)));
    assert_eq!(yes.style.font.color, Some(Rgb(0x006100)));
    assert_eq!(yes.style.border.left.line, BorderLine::Thin);
    let note = yes.note.as_ref().unwrap();
    assert_eq!(note.author, "AgenticAI");
    assert_eq!(note.text, "Module 1 is dedicated to prompting");

    let unsure = sheet.cell(3, 5).unwrap();
    assert_eq!(unsure.style.fill.color, Some(Rgb(0xFFEB9C)));
    assert_eq!(unsure.style.font.color, Some(Rgb(0x9C5700)));

    // 判定がなかったトピックは既定値
    let defaulted = sheet.cell(6, 5).unwrap();
    assert_eq!(defaulted.value, CellValue::Text("No".into()));
    assert_eq!(defaulted.note.as_ref().unwrap().text, "No analysis returned.");

    // 空行と "TOPIC END" 以降は書かない
    assert_eq!(sheet.text(5, 5), None);
    assert_eq!(sheet.text(7, 5), None);
    assert_eq!(sheet.text(8, 5), None);
}

#[test]
fn test_existing_content_is_preserved() {
    let master = build_master(true);
    let update = update_document(&master, "GenAI Pro by Acme", &decisions(), None).unwrap();
    let workbook = reload(&update.bytes);
    let sheet = workbook.sheet(COMPARISON_SHEET).unwrap();

    // 既存の競合列・メモ・数式・結合
    assert_eq!(sheet.trimmed_text(1, 4).as_deref(), Some("Bootcamp by Acme"));
    let reviewed = sheet.cell(2, 4).unwrap();
    assert_eq!(reviewed.note.as_ref().unwrap().author, "Reviewer");
    assert_eq!(reviewed.style.fill.color, None);

    match &sheet.cell(8, 4).unwrap().value {
        CellValue::Formula { formula, .. } => assert!(formula.contains("COUNTIF")),
        other => panic!("数式が失われた: {:?}", other),
    }
    assert_eq!(sheet.merges().len(), 1);
    assert_eq!(sheet.trimmed_text(9, 1).as_deref(), Some("Summary"));

    // シート順
    assert_eq!(workbook.sheet_names(), vec![COMPARISON_SHEET, PRICE_SHEET]);
}

#[test]
fn test_column_sync_is_idempotent() {
    let master = build_master(true);
    let first = update_document(&master, "GenAI Pro by Acme", &decisions(), None).unwrap();
    let second = update_document(&first.bytes, "GenAI Pro by Acme", &decisions(), None).unwrap();

    assert_eq!(first.column.column, second.column.column);
    assert!(!second.column.created);

    let a = reload(&first.bytes);
    let b = reload(&second.bytes);
    let a = a.sheet(COMPARISON_SHEET).unwrap();
    let b = b.sheet(COMPARISON_SHEET).unwrap();
    assert_eq!(a.max_col(), b.max_col());
    for row in 1..=a.max_row() {
        assert_eq!(a.text(row, 5), b.text(row, 5), "row {}", row);
    }
}

#[test]
fn test_updating_existing_column_changes_decision_colors() {
    let master = build_master(true);
    let mut map = DecisionMap::new();
    map.insert("RAG".into(), TopicVerdict::classified(Decision::No, "Not covered"));

    let update = update_document(&master, "Bootcamp by Acme", &map, None).unwrap();
    assert_eq!(update.column.column, 4);
    assert!(!update.column.created);

    let workbook = reload(&update.bytes);
    let sheet = workbook.sheet(COMPARISON_SHEET).unwrap();
    let rag = sheet.cell(3, 4).unwrap();
    assert_eq!(rag.value, CellValue::Text("No".into()));
    assert_eq!(rag.style.fill.color, Some(Rgb(0xFFC7CE)));
    // 既存の罫線はそのまま
    assert_eq!(rag.style.border.bottom.line, BorderLine::Thin);

    // マップにないトピック
    let agents = sheet.cell(6, 4).unwrap();
    assert_eq!(agents.note.as_ref().unwrap().text, "No mention found.");
    assert_eq!(sheet.max_col(), 4);
}

#[test]
fn test_row_sync_appends_then_updates() {
    let master = build_master(true);
    let first = update_document(&master, "GenAI Pro by Acme", &decisions(), Some(&row_update())).unwrap();

    let report = match &first.row {
        RowOutcome::Synced(report) => report.clone(),
        other => panic!("行同期されていない: {:?}", other),
    };
    assert_eq!(report.row, 3);
    assert!(report.created);
    assert_eq!(report.fields_written, 3);
    assert_eq!(report.unmapped_fields, vec!["Projects"]);

    let workbook = reload(&first.bytes);
    let sheet = workbook.sheet(PRICE_SHEET).unwrap();
    assert_eq!(sheet.trimmed_text(3, 1).as_deref(), Some("Acme"));
    assert_eq!(sheet.trimmed_text(3, 3).as_deref(), Some("$999"));
    assert_eq!(sheet.trimmed_text(3, 5).as_deref(), Some("$41.62"));
    assert_eq!(sheet.trimmed_text(3, 6).as_deref(), Some("https://acme.example/genai"));
    assert_eq!(sheet.cell(3, 3).unwrap().style.fill.color, Some(Rgb(0xF2F2F2)));
    assert_eq!(sheet.row_height(3), Some(24.0));

    let second = update_document(&first.bytes, "GenAI Pro by Acme", &decisions(), Some(&row_update())).unwrap();
    match &second.row {
        RowOutcome::Synced(report) => {
            assert_eq!(report.row, 3);
            assert!(!report.created);
        }
        other => panic!("行同期されていない: {:?}", other),
    }
    assert_eq!(reload(&second.bytes).sheet(PRICE_SHEET).unwrap().max_row(), 3);
}

#[test]
fn test_missing_price_sheet_skips_row() {
    let master = build_master(false);
    let update = update_document(&master, "GenAI Pro by Acme", &decisions(), Some(&row_update())).unwrap();

    assert!(matches!(update.row, RowOutcome::Skipped { .. }));
    let workbook = reload(&update.bytes);
    assert_eq!(
        workbook.sheet(COMPARISON_SHEET).unwrap().trimmed_text(1, 5).as_deref(),
        Some("GenAI Pro by Acme")
    );
}

#[test]
fn test_missing_comparison_sheet_is_fatal() {
    let mut xlsx = XlsxWorkbook::new();
    xlsx.add_worksheet().set_name("Sheet1").unwrap();
    let bytes = xlsx.save_to_buffer().unwrap();

    let err = update_document(&bytes, "Acme", &decisions(), None).unwrap_err();
    assert!(matches!(err, AppError::MissingSheet(_)));
    assert_eq!(err.to_string(), "Sheet 'Comparison' not found in master workbook");
}

#[test]
fn test_topics_and_columns_from_master() {
    let workbook = reload(&build_master(true));

    let topics = sync::collect_topics(&workbook).unwrap();
    assert_eq!(topics, TOPICS.to_vec());

    let schema = sync::price_columns(&workbook).unwrap();
    assert_eq!(schema.extraction_fields(), vec!["Price", "Duration", "Price/Week"]);
}

#[test]
fn test_sync_keeps_sheet_features_it_does_not_edit() {
    let master = build_decorated_master();
    let update = update_document(&master, "GenAI Pro by Acme", &decisions(), None).unwrap();
    assert!(update.column.created);

    let sheet_xml = read_part(&update.bytes, "xl/worksheets/sheet1.xml");
    assert!(sheet_xml.contains("<pane"), "ウィンドウ枠固定が失われた");
    assert!(sheet_xml.contains("<hyperlink"), "リンクが失われた");
    assert!(sheet_xml.contains("<conditionalFormatting"), "条件付き書式が失われた");
    assert!(sheet_xml.contains("<dataValidation"), "入力規則が失われた");

    // テーマ色は RGB に置き換えない
    let styles_xml = read_part(&update.bytes, "xl/styles.xml");
    assert!(styles_xml.contains("theme=\"4\""));
    assert!(!styles_xml.contains("FF4F81BD"));

    let workbook = reload(&update.bytes);
    let sheet = workbook.sheet(COMPARISON_SHEET).unwrap();
    assert_eq!(sheet.trimmed_text(1, 5).as_deref(), Some("GenAI Pro by Acme"));
    assert_eq!(sheet.trimmed_text(2, 5).as_deref(), Some("Yes"));
}
