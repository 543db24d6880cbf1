//! マスタExcelへの同期
//!
//! どちらの同期も渡された Workbook を直接書き換える。保存は呼び出し側。

pub mod column;
pub mod layout;
pub mod row;

pub use column::{
    competitor_label, decision_palette, reference_column, sync_competitor_column, ColumnSyncReport,
};
pub use layout::{collect_topics, price_columns, COMPARISON_SHEET, PRICE_SHEET, TOPIC_END};
pub use row::{should_sync_row, sync_competitor_row, CompetitorIdentity, RowSyncReport};
