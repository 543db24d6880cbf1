use crate::ai_provider::AiProvider;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 既定のGeminiモデル
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// APIキーの環境変数（先頭優先）
const API_KEY_VARS: &[&str] = &["GEMINI_KEY", "GEMINI_API_KEY"];

/// モデル指定の環境変数（先頭優先）
const MODEL_VARS: &[&str] = &["GEMINI_PRO", "GEMINI_LITE"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// 既定のモデル呼び出し経路
    pub provider: Option<AiProvider>,
    pub timeout_seconds: u64,
    /// プロンプトと生レスポンスの保存先（未設定なら保存しない）
    pub trace_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            provider: None,
            timeout_seconds: 120,
            trace_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("competitor-iq").join("config.json"))
    }

    /// APIキーを解決する
    ///
    /// 優先順位: 引数 > GEMINI_KEY > GEMINI_API_KEY > 設定ファイル
    pub fn get_api_key(&self, explicit: Option<&str>) -> Result<String> {
        self.api_key_from(explicit, |name| std::env::var(name).ok())
    }

    pub fn api_key_from<F>(&self, explicit: Option<&str>, env: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(explicit.map(str::to_string))
            .or_else(|| API_KEY_VARS.iter().find_map(|&name| non_empty(env(name))))
            .or_else(|| non_empty(self.api_key.clone()))
            .ok_or(AppError::MissingApiKey)
    }

    /// 使用モデルを解決する
    ///
    /// 優先順位: 引数 > GEMINI_PRO > GEMINI_LITE > 設定ファイル > gemini-2.5-flash
    pub fn resolve_model(&self, explicit: Option<&str>) -> String {
        self.model_from(explicit, |name| std::env::var(name).ok())
    }

    pub fn model_from<F>(&self, explicit: Option<&str>, env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(explicit.map(str::to_string))
            .or_else(|| MODEL_VARS.iter().find_map(|&name| non_empty(env(name))))
            .or_else(|| non_empty(self.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// 呼び出し経路を解決する（引数 > 設定ファイル > Gemini API）
    pub fn resolve_provider(&self, explicit: Option<AiProvider>) -> AiProvider {
        explicit.or(self.provider).unwrap_or_default()
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn set_model(&mut self, model: String) -> Result<()> {
        self.model = Some(model);
        self.save()
    }

    pub fn set_provider(&mut self, provider: AiProvider) -> Result<()> {
        self.provider = Some(provider);
        self.save()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
