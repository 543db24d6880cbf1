//! トピック文字列の正規化

use std::collections::HashSet;

/// 照合キー: 前後空白を除去して小文字化
pub fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase()
}

/// 順序を保ったまま重複を除去する
///
/// 各要素は前後空白を除去し、空文字は捨てる。
pub fn dedup_topics<I, S>(topics: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for topic in topics {
        let topic = topic.as_ref().trim();
        if topic.is_empty() {
            continue;
        }
        if seen.insert(topic.to_string()) {
            result.push(topic.to_string());
        }
    }
    result
}

/// 連続する空白・改行を1つの空白にまとめる
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_topic() {
        assert_eq!(normalize_topic("  Vector Databases "), "vector databases");
        assert_eq!(normalize_topic("RAG"), "rag");
    }

    #[test]
    fn test_dedup_topics_preserves_order() {
        let topics = vec!["RAG", " Agents", "RAG", "", "Agents ", "Fine-tuning"];
        assert_eq!(dedup_topics(topics), vec!["RAG", "Agents", "Fine-tuning"]);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Price:\n\n $999 \t per  seat "), "Price: $999 per seat");
    }
}
