//! 本文からの価格ヒューリスティック抽出
//!
//! モデルが価格を返さなかった場合に使う。
//! 料金系キーワードの前後約300文字の窓を文書順に調べ、
//! 窓内で最初に見つかった「通貨 + 金額」を採用する。
//! どの窓にもなければ本文全体を走査する。

use regex::Regex;

/// キーワード前後の窓幅（片側）
const WINDOW_RADIUS: usize = 150;

lazy_static::lazy_static! {
    static ref KEYWORD_RE: Regex =
        Regex::new(r"(?i)\b(?:fees?|price|pricing|cost|tuition|enrol(?:l|lment|ment)?)").unwrap();
    // フォールバックでは通貨の明示を必須にする（"12 weeks" を価格と誤認しないため）
    static ref CURRENCY_AMOUNT_RE: Regex = Regex::new(
        r"(?:[$€£₹]|\b(?:USD|INR|EUR|GBP|Rs\.?))\s*\d+(?:,\d{2,3})*(?:\.\d+)?"
    ).unwrap();
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    let len = text.len();
    idx = idx.min(len);
    while idx < len && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// キーワード周辺の窓を文書順に返す
fn keyword_windows(text: &str) -> impl Iterator<Item = &str> {
    KEYWORD_RE.find_iter(text).map(move |m| {
        let start = floor_boundary(text, m.start().saturating_sub(WINDOW_RADIUS));
        let end = ceil_boundary(text, m.end() + WINDOW_RADIUS);
        &text[start..end]
    })
}

/// 本文から価格表記を探す
///
/// # Returns
/// * `Some(&str)` - 見つかった価格表記（例: "$999", "INR 82,000"）
/// * `None` - 通貨付きの金額がどこにもない
pub fn find_price_in_text(text: &str) -> Option<&str> {
    keyword_windows(text)
        .find_map(|window| CURRENCY_AMOUNT_RE.find(window))
        .or_else(|| CURRENCY_AMOUNT_RE.find(text))
        .map(|m| m.as_str().trim())
}
