//! 価格文字列のパース

use regex::Regex;

/// パース済みの価格
#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub amount: f64,
    /// 通貨記号（$, €, £, ₹）。記号がなければ空文字
    pub currency: String,
}

/// 価格文字列から金額と通貨記号を取り出す
///
/// 通貨記号（任意）+ 桁区切り付き数値 + 小数部（任意）の最初の一致を使う。
/// 桁区切りはインド式（1,20,000）も受け付ける。
/// 数値がなければ None（"Free" など）。
///
/// # Examples
/// ```
/// use competitor_iq_common::pricing::parse_price;
///
/// let price = parse_price("$1,299.50 per seat").unwrap();
/// assert_eq!(price.amount, 1299.5);
/// assert_eq!(price.currency, "$");
/// ```
pub fn parse_price(text: &str) -> Option<Price> {
    lazy_static::lazy_static! {
        static ref PRICE_RE: Regex =
            Regex::new(r"([$€£₹])?\s*(\d+(?:,\d{2,3})*)(?:\.(\d+))?").unwrap();
    }

    let caps = PRICE_RE.captures(text)?;
    let integer = caps.get(2)?.as_str().replace(',', "");
    let number = match caps.get(3) {
        Some(fraction) => format!("{}.{}", integer, fraction.as_str()),
        None => integer,
    };

    Some(Price {
        amount: number.parse().ok()?,
        currency: caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_with_symbol() {
        let price = parse_price("$999").unwrap();
        assert_eq!(price.amount, 999.0);
        assert_eq!(price.currency, "$");
    }

    #[test]
    fn test_parse_price_code_prefix() {
        let price = parse_price("INR 82,000").unwrap();
        assert_eq!(price.amount, 82000.0);
        assert_eq!(price.currency, "");
    }

    #[test]
    fn test_parse_price_rupee_symbol() {
        let price = parse_price("Fee: ₹ 1,20,000").unwrap();
        assert_eq!(price.currency, "₹");
        assert_eq!(price.amount, 120000.0);
    }

    #[test]
    fn test_parse_price_free() {
        assert_eq!(parse_price("Free"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_parse_price_first_amount_wins() {
        let price = parse_price("$999 or INR 82,000").unwrap();
        assert_eq!(price.amount, 999.0);
        assert_eq!(price.currency, "$");
    }
}
