//! 分析結果の型定義
//!
//! CLIとライブラリで共有される型:
//! - Decision / TopicVerdict: トピック単位の判定
//! - TopicRecord: AIが返す生レコード（寛容にデシリアライズ）
//! - DecisionMap: 正規トピック順を保持した判定マップ
//! - FieldMap: 価格・期間シートへ書き込むフィールド値

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// 判定値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Decision {
    Yes,
    #[default]
    No,
    Unsure,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Yes => "Yes",
            Decision::No => "No",
            Decision::Unsure => "Unsure",
        }
    }

    /// AI出力の判定文字列を正規化する
    ///
    /// 先頭のみ大文字・残り小文字に揃えてから照合し、
    /// Yes/No/Unsure 以外（"maybe", "", "YES!" など）はすべて No になる。
    pub fn coerce(raw: &str) -> Decision {
        match title_case(raw.trim()).as_str() {
            "Yes" => Decision::Yes,
            "Unsure" => Decision::Unsure,
            _ => Decision::No,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// 判定の出どころ
///
/// 出力上はどちらも "No" になりうるが、分類器が実際に言及したのか
/// 未回答のため既定値が入ったのかをここで区別する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerdictOrigin {
    #[default]
    Classified,
    Defaulted,
}

/// トピック単位の判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicVerdict {
    pub decision: Decision,
    pub reasoning: String,
    #[serde(default)]
    pub origin: VerdictOrigin,
}

/// AI未回答時の既定理由
pub const NO_ANALYSIS_RETURNED: &str = "No analysis returned.";

impl TopicVerdict {
    pub fn classified(decision: Decision, reasoning: impl Into<String>) -> Self {
        Self {
            decision,
            reasoning: reasoning.into(),
            origin: VerdictOrigin::Classified,
        }
    }

    /// 未回答トピックの既定値 {No, "No analysis returned."}
    pub fn defaulted() -> Self {
        Self {
            decision: Decision::No,
            reasoning: NO_ANALYSIS_RETURNED.to_string(),
            origin: VerdictOrigin::Defaulted,
        }
    }
}

/// AIが返すトピック判定の生レコード
///
/// 欠損フィールドは既定値、decision の既定は "No"。
/// 文字列以外の値が来ても文字列化して受け取る。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub topic: String,
    #[serde(default = "default_decision", deserialize_with = "lenient_decision")]
    pub decision: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reasoning: String,
}

fn default_decision() -> String {
    "No".to_string()
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

fn lenient_decision<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => default_decision(),
        other => value_to_string(&other),
    })
}

/// JSON値をセル書き込み用の文字列に変換
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// 正規トピック順を保持した判定マップ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionMap {
    order: Vec<String>,
    verdicts: HashMap<String, TopicVerdict>,
}

impl DecisionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// すべてのトピックを既定値 {No, "No analysis returned."} で初期化
    pub fn with_defaults(topics: &[String]) -> Self {
        let mut map = Self::new();
        for topic in topics {
            map.insert(topic.clone(), TopicVerdict::defaulted());
        }
        map
    }

    /// 判定を設定（既存キーは上書き、順序は最初の挿入位置のまま）
    pub fn insert(&mut self, topic: String, verdict: TopicVerdict) {
        if !self.verdicts.contains_key(&topic) {
            self.order.push(topic.clone());
        }
        self.verdicts.insert(topic, verdict);
    }

    pub fn get(&self, topic: &str) -> Option<&TopicVerdict> {
        self.verdicts.get(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.verdicts.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn topics(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TopicVerdict)> {
        self.order
            .iter()
            .filter_map(|t| self.verdicts.get(t).map(|v| (t.as_str(), v)))
    }

    /// 判定ごとの件数 (Yes, No, Unsure)
    pub fn counts(&self) -> (usize, usize, usize) {
        self.iter().fold((0, 0, 0), |(y, n, u), (_, v)| match v.decision {
            Decision::Yes => (y + 1, n, u),
            Decision::No => (y, n + 1, u),
            Decision::Unsure => (y, n, u + 1),
        })
    }

    /// 生レコード形式に戻す（保存・再同期用）
    pub fn to_records(&self) -> Vec<TopicRecord> {
        self.iter()
            .map(|(topic, v)| TopicRecord {
                topic: topic.to_string(),
                decision: v.decision.as_str().to_string(),
                reasoning: v.reasoning.clone(),
            })
            .collect()
    }
}

/// 照合レポート
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// 正規トピックに解決できたレコード数
    pub matched: usize,
    /// 正規トピック数
    pub total: usize,
    /// 解決できず破棄したレコードのトピック名
    pub unmatched: Vec<String>,
    /// 正規化後に衝突したトピック（先勝ち）
    pub colliding: Vec<String>,
}

/// フィールド名 → 値（挿入順保持、名前は大文字小文字を区別せず照合）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_coerce() {
        assert_eq!(Decision::coerce("yes"), Decision::Yes);
        assert_eq!(Decision::coerce("UNSURE"), Decision::Unsure);
        assert_eq!(Decision::coerce("No"), Decision::No);
        assert_eq!(Decision::coerce("maybe"), Decision::No);
        assert_eq!(Decision::coerce(""), Decision::No);
        assert_eq!(Decision::coerce("YES!"), Decision::No);
    }

    #[test]
    fn test_topic_record_lenient() {
        let json = r#"[{"topic": "RAG"}, {"topic": "Agents", "decision": null, "reasoning": 3}]"#;
        let records: Vec<TopicRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].decision, "No");
        assert_eq!(records[0].reasoning, "");
        assert_eq!(records[1].decision, "No");
        assert_eq!(records[1].reasoning, "3");
    }

    #[test]
    fn test_decision_map_keeps_first_position() {
        let mut map = DecisionMap::with_defaults(&["A".to_string(), "B".to_string()]);
        map.insert("A".to_string(), TopicVerdict::classified(Decision::Yes, "explicit"));
        let topics: Vec<&str> = map.iter().map(|(t, _)| t).collect();
        assert_eq!(topics, vec!["A", "B"]);
        assert_eq!(map.get("A").unwrap().decision, Decision::Yes);
        assert_eq!(map.get("B").unwrap().origin, VerdictOrigin::Defaulted);
        assert_eq!(map.counts(), (1, 1, 0));
    }

    #[test]
    fn test_field_map_case_insensitive() {
        let mut fields = FieldMap::new();
        fields.insert("Price", "$999");
        fields.insert("price", "$899");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("PRICE"), Some("$899"));

        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"Price":"$899"}"#);
    }
}
