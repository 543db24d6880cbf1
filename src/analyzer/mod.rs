//! モデル呼び出しとリトライ
//!
//! - classify_topics: トピック網羅判定 → 正規トピックとの照合
//! - extract_price_duration: 価格・期間などの抽出 → 欠損補完
//!
//! どちらも最大2回試行し、JSONとして読めない応答も失敗として扱う。

mod backend;
mod cli_backend;
mod gemini;
pub mod retry;

pub use backend::ModelBackend;
pub use cli_backend::CliBackend;
pub use gemini::GeminiClient;
pub use retry::{FailureKind, RetryExhausted, RetryPolicy, Sleeper, ThreadSleeper};

use crate::ai_provider::AiProvider;
use crate::config::Config;
use crate::error::{AppError, Result};
use competitor_iq_common::{
    build_classification_prompt, build_extraction_prompt, parse_classification_response,
    parse_extraction_response, pricing, reconcile, FieldMap, Reconciliation,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 処理種別（ログ・エラーメッセージ用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Classification,
    Extraction,
}

impl Operation {
    fn label(&self) -> &'static str {
        match self {
            Operation::Classification => "Analysis",
            Operation::Extraction => "Price/Duration Extraction",
        }
    }

    fn trace_name(&self) -> &'static str {
        match self {
            Operation::Classification => "classification",
            Operation::Extraction => "extraction",
        }
    }

    /// リトライ上限到達時のエラーを作る
    fn exhausted(&self, model: &str, exhausted: RetryExhausted) -> AppError {
        let quota_exhausted = exhausted.last_kind == FailureKind::Quota;
        let message = if quota_exhausted {
            quota_message(model)
        } else {
            let prefix = match self {
                Operation::Classification => "Analysis failed",
                Operation::Extraction => "Price/Duration extraction failed",
            };
            format!(
                "{} after {} attempts. Last error: {}",
                prefix, exhausted.attempts, exhausted.last_error
            )
        };

        match self {
            Operation::Classification => AppError::Analysis { message, quota_exhausted },
            Operation::Extraction => AppError::Extraction { message, quota_exhausted },
        }
    }
}

/// クォータ超過時の案内メッセージ
fn quota_message(model: &str) -> String {
    format!(
        "Gemini Quota Exceeded for {model}\n\n\
         You have hit the rate limit for this model. Please:\n\
         1. Wait a minute and try again.\n\
         2. Switch to gemini-2.5-flash (it has higher limits).\n\
         3. Or use a different (paid) API key."
    )
}

/// プロバイダ設定からバックエンドを作る
pub fn build_backend(
    provider: AiProvider,
    config: &Config,
    api_key: Option<&str>,
    model: Option<&str>,
) -> Result<Box<dyn ModelBackend>> {
    if provider.requires_api_key() {
        let key = config.get_api_key(api_key)?;
        let model = config.resolve_model(model);
        info!("Using Gemini Model: {}", model);
        Ok(Box::new(GeminiClient::new(key, model, config.timeout_seconds)?))
    } else {
        Ok(Box::new(CliBackend::new(provider)?))
    }
}

pub struct Analyzer<'a> {
    backend: &'a dyn ModelBackend,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    trace_dir: Option<PathBuf>,
}

impl<'a> Analyzer<'a> {
    pub fn new(backend: &'a dyn ModelBackend, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            backend,
            sleeper,
            policy: RetryPolicy::default(),
            trace_dir: None,
        }
    }

    /// プロンプトと生レスポンスを保存するディレクトリ
    pub fn with_trace_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.trace_dir = dir;
        self
    }

    /// トピック網羅判定
    ///
    /// # Arguments
    /// * `topics` - 正規トピック一覧
    /// * `content` - 競合コースの本文
    ///
    /// # Returns
    /// * `Ok(Reconciliation)` - 全トピックを網羅した判定と照合レポート
    /// * `Err(AppError::Analysis)` - 2回とも失敗
    pub fn classify_topics(&self, topics: &[String], content: &str) -> Result<Reconciliation> {
        let op = Operation::Classification;
        let prompt = build_classification_prompt(topics, content);

        let records = retry::run_with_retry(&self.policy, self.sleeper, op.label(), |_| {
            let response = self.backend.generate(&prompt)?;
            self.write_trace(op, &prompt, &response);
            Ok(parse_classification_response(&response)?)
        })
        .map_err(|e| op.exhausted(self.backend.model_name(), e))?;

        Ok(reconcile(topics, &records))
    }

    /// 価格・期間などの抽出
    ///
    /// モデルの抽出結果を一次値とし、欠けた価格・期間は本文から補い、
    /// Price/Week を導出する。`fields` の全項目が必ず含まれる。
    ///
    /// # Arguments
    /// * `source` - 情報元（URLなど）
    /// * `fields` - 抽出対象カラム（識別カラムは除外済み）
    /// * `content` - 本文
    pub fn extract_price_duration(
        &self,
        source: &str,
        fields: &[String],
        content: &str,
    ) -> Result<FieldMap> {
        let op = Operation::Extraction;
        let prompt = build_extraction_prompt(source, fields, content);

        let primary = retry::run_with_retry(&self.policy, self.sleeper, op.label(), |_| {
            let response = self.backend.generate(&prompt)?;
            self.write_trace(op, &prompt, &response);
            Ok(parse_extraction_response(&response)?)
        })
        .map_err(|e| op.exhausted(self.backend.model_name(), e))?;

        info!("Successfully extracted information for {} fields", primary.len());
        Ok(pricing::complete_fields(fields, &primary, content))
    }

    fn write_trace(&self, op: Operation, prompt: &str, response: &str) {
        if let Some(dir) = &self.trace_dir {
            if let Err(e) = write_trace_files(dir, op.trace_name(), prompt, response) {
                warn!("Failed to write trace logs: {}", e);
            }
        }
    }
}

fn write_trace_files(dir: &Path, name: &str, prompt: &str, response: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(format!("{}_prompt.md", name)), prompt)?;
    std::fs::write(dir.join(format!("{}_output.json", name)), response)?;
    Ok(())
}
