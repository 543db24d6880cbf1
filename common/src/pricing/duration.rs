//! 期間文字列 → 週数の変換
//!
//! 単位の優先順位: 週 > 月 > 時間
//! - 週: そのまま
//! - 月: × 4
//! - 時間: ÷ 10（学習時間を週10時間として換算）

use regex::Regex;

const WEEKS_PER_MONTH: f64 = 4.0;
const HOURS_PER_WEEK: f64 = 10.0;

lazy_static::lazy_static! {
    static ref WEEKS_RE: Regex = Regex::new(
        r"(?i)(\d+(?:\.\d+)?)(?:\s*(?:-|to)\s*\d+(?:\.\d+)?)?[\s-]*(?:weeks?|wks?)\b"
    ).unwrap();
    static ref MONTHS_RE: Regex = Regex::new(
        r"(?i)(\d+(?:\.\d+)?)(?:\s*(?:-|to)\s*\d+(?:\.\d+)?)?[\s-]*months?\b"
    ).unwrap();
    static ref HOURS_RE: Regex = Regex::new(
        r"(?i)(\d+(?:\.\d+)?)(?:\s*(?:-|to)\s*\d+(?:\.\d+)?)?[\s-]*(?:hours?|hrs?)\b"
    ).unwrap();
}

fn leading_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// 期間文字列を週数に変換する
///
/// 単位の直前にある数値を使う。範囲（"12-16 weeks"）は下限を採用。
/// 単位が見つからなければ None（"self-paced" など）。
pub fn duration_to_weeks(text: &str) -> Option<f64> {
    if let Some(weeks) = leading_number(&WEEKS_RE, text) {
        return Some(weeks);
    }
    if let Some(months) = leading_number(&MONTHS_RE, text) {
        return Some(months * WEEKS_PER_MONTH);
    }
    leading_number(&HOURS_RE, text).map(|hours| hours / HOURS_PER_WEEK)
}

/// 本文中で最初に現れる「数値 + 期間単位」の句を返す
pub fn find_duration_phrase(text: &str) -> Option<&str> {
    [&*WEEKS_RE, &*MONTHS_RE, &*HOURS_RE]
        .iter()
        .filter_map(|re| re.find(text))
        .min_by_key(|m| m.start())
        .map(|m| m.as_str())
}
