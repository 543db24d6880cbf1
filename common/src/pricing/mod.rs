//! 価格・期間の構造化抽出
//!
//! モデルの抽出結果（一次値）を基本とし、欠けている項目は本文から補う。
//! Price/Week は価格と週数から導出する。要求されたフィールドは必ずすべて埋める。

mod amount;
mod duration;
mod fallback;

pub use amount::{parse_price, Price};
pub use duration::{duration_to_weeks, find_duration_phrase};
pub use fallback::find_price_in_text;

use crate::types::FieldMap;
use tracing::debug;

/// 値が見つからなかったフィールドに入れる文字列
pub const NOT_SPECIFIED: &str = "Not specified";

const ABSENT_VALUES: &[&str] = &[
    "",
    "n/a",
    "na",
    "none",
    "not specified",
    "not available",
    "unknown",
];

/// 「値なし」とみなす文字列か
pub fn is_absent(value: &str) -> bool {
    ABSENT_VALUES.contains(&value.trim().to_lowercase().as_str())
}

/// フィールド名から役割を判定する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Price,
    Duration,
    PricePerWeek,
    Other,
}

impl FieldKind {
    pub fn of(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("price") && lower.contains("week") {
            FieldKind::PricePerWeek
        } else if lower.contains("price") {
            FieldKind::Price
        } else if lower.contains("duration") {
            FieldKind::Duration
        } else {
            FieldKind::Other
        }
    }
}

/// 週あたり価格を計算する
///
/// 価格に数値があり、週数が正の場合のみ。小数2桁、通貨記号は維持。
///
/// # Examples
/// ```
/// use competitor_iq_common::pricing::price_per_week;
///
/// assert_eq!(price_per_week("$999", "6 months").as_deref(), Some("$41.62"));
/// assert_eq!(price_per_week("Free", "6 months"), None);
/// ```
pub fn price_per_week(price: &str, duration: &str) -> Option<String> {
    let price = parse_price(price)?;
    let weeks = duration_to_weeks(duration)?;
    if weeks <= 0.0 {
        return None;
    }
    Some(format!("{}{:.2}", price.currency, price.amount / weeks))
}

fn primary_value<'a>(primary: &'a FieldMap, name: &str) -> Option<&'a str> {
    primary.get(name).filter(|v| !is_absent(v))
}

/// 一次抽出結果を補完して、要求フィールドをすべて埋めた FieldMap を作る
///
/// # Arguments
/// * `fields` - 書き込み対象のカラム名（識別カラムは除外済み）
/// * `primary` - モデルの抽出結果
/// * `text` - 抽出元の本文（フォールバック用）
///
/// # Returns
/// `fields` の順で全項目を含む FieldMap。値がなければ "Not specified"
pub fn complete_fields(fields: &[String], primary: &FieldMap, text: &str) -> FieldMap {
    let price_field = fields.iter().find(|f| FieldKind::of(f) == FieldKind::Price);
    let duration_field = fields.iter().find(|f| FieldKind::of(f) == FieldKind::Duration);

    let price: Option<String> = price_field
        .and_then(|f| primary_value(primary, f))
        .map(str::to_string)
        .or_else(|| {
            let found = find_price_in_text(text).map(str::to_string);
            debug!("価格フォールバック: {:?}", found);
            found
        });

    let duration: Option<String> = duration_field
        .and_then(|f| primary_value(primary, f))
        .map(str::to_string)
        .or_else(|| {
            let found = find_duration_phrase(text).map(str::to_string);
            debug!("期間フォールバック: {:?}", found);
            found
        });

    let mut result = FieldMap::new();
    for field in fields {
        let value = match FieldKind::of(field) {
            FieldKind::Price if Some(field) == price_field => price.clone(),
            FieldKind::Duration if Some(field) == duration_field => duration.clone(),
            FieldKind::PricePerWeek => {
                let derived = match (&price, &duration) {
                    (Some(p), Some(d)) => price_per_week(p, d),
                    _ => None,
                };
                derived.or_else(|| primary_value(primary, field).map(str::to_string))
            }
            _ => primary_value(primary, field).map(str::to_string),
        };
        result.insert(field.clone(), value.unwrap_or_else(|| NOT_SPECIFIED.to_string()));
    }
    result
}
