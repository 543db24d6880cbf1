//! プロンプト生成モジュール
//!
//! - build_classification_prompt: トピック網羅判定用プロンプト
//! - build_extraction_prompt: 価格・期間などの抽出用プロンプト

/// 抽出プロンプトに含める本文の最大文字数
pub const EXTRACTION_CONTENT_LIMIT: usize = 10_000;

/// 判定プロンプト生成
///
/// # Arguments
/// * `topics` - 正規トピック一覧
/// * `content` - 競合コースの本文（抽出済みテキスト）
///
/// # Returns
/// 判定用のプロンプト文字列
pub fn build_classification_prompt(topics: &[String], content: &str) -> String {
    let topics_json = serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"## SYSTEM
You are an expert technical curriculum analyst specializing in enterprise AI and software training programs.

### Context
You are given a list of technical topics and a competitor's program content.

### Task
For EACH topic in the list, decide whether the competitor's content explicitly covers the topic,
or clearly and unambiguously implies the same concept using different terminology.
The decision must be one of: Yes, No, Unsure.

### Decision rules
1. "Yes" only if the topic is directly mentioned, or described in a way a technical professional
   would uniquely map to that topic.
2. "No" if there is no reference to the topic or its equivalent concept, or the content only uses
   generic wording ("AI", "ML", "GenAI", "automation", "analytics", "cloud", "modern platforms").
3. "Unsure" if there is a partial or indirect signal but the content is too vague to decide.
4. Do not infer subtopics from broader topics unless the subtopic is clearly described.
5. Evaluate EVERY topic in the list. Do not skip any topic.
6. If the match is implied rather than quoted, say so in the reasoning.
7. The reasoning must justify the decision: what was mentioned, why the wording is too generic,
   or which weak signal caused the uncertainty.

### Output rules
1. Output MUST be a valid JSON list of objects.
2. Each object must follow this schema:
```json
{{"topic": "Topic Name", "decision": "Yes, No, or Unsure", "reasoning": "Concise justification"}}
```
3. The "topic" field must match the input topic exactly.
4. Do not add, remove, rename, normalize or merge topic names.

---
Competitor Content:
{content}

Topics List:
{topics_json}"#
    )
}

/// 抽出対象カラムごとのヒント
fn column_hints(columns: &[String]) -> String {
    columns
        .iter()
        .filter_map(|col| {
            let lower = col.to_lowercase();
            let hint = if lower.contains("price") && lower.contains("week") {
                return None;
            } else if lower.contains("price") {
                "course fees, pricing, cost, subscription fees. Include the currency."
            } else if lower.contains("duration") {
                "course length, time to complete, hours, weeks or months."
            } else if lower.contains("project") {
                "number of projects, capstone or hands-on projects, assignments."
            } else if lower.contains("service") {
                "career support, mentorship, certification, job assistance."
            } else if lower.contains("eligib") {
                "prerequisites, requirements, who can enroll."
            } else {
                return None;
            };
            Some(format!("- \"{}\": look for {}", col, hint))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 先頭から最大 `limit` 文字を取り出す（文字境界を保つ）
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 抽出プロンプト生成
///
/// # Arguments
/// * `source` - 情報元（URLなど、表示用）
/// * `columns` - 抽出対象カラム（識別カラムは除外済み）
/// * `content` - 本文。先頭 `EXTRACTION_CONTENT_LIMIT` 文字のみ使用
pub fn build_extraction_prompt(source: &str, columns: &[String], content: &str) -> String {
    let columns_json = serde_json::to_string(columns).unwrap_or_else(|_| "[]".to_string());
    let hints = column_hints(columns);
    let body = truncate_chars(content, EXTRACTION_CONTENT_LIMIT);

    format!(
        r#"## SYSTEM
You are an expert at extracting structured information from course and training program websites.

### Task
Extract specific information from the content below. Source: {source}

### Columns to Extract
{columns_json}

### Hints
{hints}

### Instructions
1. Extract a value for every column listed above.
2. If information is not found for a column, use "Not specified".
3. Be precise and keep exact values when possible (e.g. "$999", "6 months", "5 projects").

### Output Format
Output MUST be a valid JSON object whose keys are the column names and whose values are strings.

### Content
{body}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_prompt_contains_topics() {
        let topics = vec!["RAG".to_string(), "Vector Databases".to_string()];
        let prompt = build_classification_prompt(&topics, "We teach retrieval pipelines.");
        assert!(prompt.contains(r#"["RAG","Vector Databases"]"#));
        assert!(prompt.contains("We teach retrieval pipelines."));
        assert!(prompt.contains("must match the input topic exactly"));
    }

    #[test]
    fn test_extraction_prompt_truncates_content() {
        let content = "x".repeat(EXTRACTION_CONTENT_LIMIT + 500);
        let prompt = build_extraction_prompt("https://example.com", &["Price".to_string()], &content);
        assert!(prompt.contains(&"x".repeat(EXTRACTION_CONTENT_LIMIT)));
        assert!(!prompt.contains(&"x".repeat(EXTRACTION_CONTENT_LIMIT + 1)));
        assert!(prompt.contains("- \"Price\": look for"));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("₹82,000", 2), "₹8");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
