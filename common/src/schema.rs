//! カラムスキーマ
//!
//! シートのヘッダー行から「カラム名 → 列番号」の表を一度だけ作る。
//! 列番号は 1 始まり。名前の照合は前後空白を除去した上で大文字小文字を区別しない。

use std::collections::HashMap;

/// 識別カラム（抽出対象から除外）
pub const IDENTITY_COLUMNS: &[&str] = &["provider", "course name", "website link", "remarks"];

pub const PROVIDER_COLUMN: &str = "Provider";
pub const COURSE_NAME_COLUMN: &str = "Course Name";
pub const WEBSITE_LINK_COLUMN: &str = "Website Link";

#[derive(Debug, Clone, Default)]
pub struct ColumnSchema {
    /// 列順のヘッダー（空セルは None）
    headers: Vec<Option<String>>,
    index: HashMap<String, u32>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ColumnSchema {
    /// ヘッダー行（1列目から順）からスキーマを作る
    ///
    /// 同名カラムが複数ある場合は左側を採用する。
    pub fn from_headers(headers: Vec<Option<String>>) -> Self {
        let headers: Vec<Option<String>> = headers
            .into_iter()
            .map(|h| h.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
            .collect();

        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if let Some(name) = header {
                index.entry(key(name)).or_insert(i as u32 + 1);
            }
        }

        Self { headers, index }
    }

    /// カラム名から列番号（1始まり）を引く
    pub fn column(&self, name: &str) -> Option<u32> {
        self.index.get(&key(name)).copied()
    }

    /// 名前のあるカラムを列順で返す
    pub fn names(&self) -> Vec<String> {
        self.headers.iter().flatten().cloned().collect()
    }

    /// JSON出力用（空セルは null）
    pub fn headers(&self) -> &[Option<String>] {
        &self.headers
    }

    /// 抽出対象カラム（識別カラムを除く）
    pub fn extraction_fields(&self) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|name| !IDENTITY_COLUMNS.contains(&key(name).as_str()))
            .collect()
    }
}
