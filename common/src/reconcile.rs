//! AI判定と正規トピック一覧の照合
//!
//! 1. 全トピックを {No, "No analysis returned."} で初期化
//! 2. 完全一致 → 正規化一致（trim + 小文字）の順で解決
//! 3. 解決できないレコードは破棄してレポートに記録
//! 4. 同一トピックへの複数レコードは後勝ち

use crate::normalize::normalize_topic;
use crate::types::{Decision, DecisionMap, ReconcileReport, TopicRecord, TopicVerdict};
use std::collections::HashMap;
use tracing::{info, warn};

/// 照合結果
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub decisions: DecisionMap,
    pub report: ReconcileReport,
}

/// 生レコードを正規トピック一覧に照合する
///
/// # Arguments
/// * `topics` - 正規トピック一覧（重複除去済み、順序が行配置に対応）
/// * `records` - AIが返した生レコード
///
/// # Returns
/// 全トピックを網羅した判定マップと照合レポート
pub fn reconcile(topics: &[String], records: &[TopicRecord]) -> Reconciliation {
    let mut decisions = DecisionMap::with_defaults(topics);
    let mut report = ReconcileReport {
        total: decisions.len(),
        ..Default::default()
    };

    let mut index: HashMap<String, &str> = HashMap::new();
    for topic in topics {
        let key = normalize_topic(topic);
        match index.get(&key) {
            Some(first) if *first != topic.as_str() => {
                warn!("正規化後に衝突するトピック: '{}' と '{}'（先勝ち）", first, topic);
                report.colliding.push(topic.clone());
            }
            Some(_) => {}
            None => {
                index.insert(key, topic.as_str());
            }
        }
    }

    for record in records {
        let target = if decisions.contains(&record.topic) {
            Some(record.topic.clone())
        } else {
            index
                .get(&normalize_topic(&record.topic))
                .map(|t| t.to_string())
        };

        match target {
            Some(topic) => {
                let verdict = TopicVerdict::classified(
                    Decision::coerce(&record.decision),
                    record.reasoning.clone(),
                );
                decisions.insert(topic, verdict);
                report.matched += 1;
            }
            None => {
                warn!("Unmatched topic from AI: '{}'", record.topic);
                report.unmatched.push(record.topic.clone());
            }
        }
    }

    info!("Matched {}/{} topics", report.matched, report.total);

    Reconciliation { decisions, report }
}
