use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// モデル呼び出し経路
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AiProvider {
    /// Gemini REST API（APIキー必須）
    #[default]
    GeminiApi,
    /// ローカルの claude CLI
    Claude,
    /// ローカルの codex CLI
    Codex,
    /// ローカルの gemini CLI
    Gemini,
}

impl AiProvider {
    /// CLI経由の場合の実行コマンド名
    pub fn command_name(&self) -> Option<&'static str> {
        match self {
            AiProvider::GeminiApi => None,
            AiProvider::Claude => Some("claude"),
            AiProvider::Codex => Some("codex"),
            AiProvider::Gemini => Some("gemini"),
        }
    }

    /// プロンプトを渡すためのコマンド引数
    pub fn command_args(&self, prompt: &str) -> Vec<String> {
        match self {
            AiProvider::Claude => vec![
                "-p".into(),
                prompt.into(),
                "--output-format".into(),
                "text".into(),
            ],
            AiProvider::Codex => vec!["exec".into(), prompt.into()],
            AiProvider::Gemini => vec!["-p".into(), prompt.into()],
            AiProvider::GeminiApi => Vec::new(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::GeminiApi => "gemini-api",
            AiProvider::Claude => "claude",
            AiProvider::Codex => "codex",
            AiProvider::Gemini => "gemini",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, AiProvider::GeminiApi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name() {
        assert_eq!(AiProvider::GeminiApi.command_name(), None);
        assert_eq!(AiProvider::Claude.command_name(), Some("claude"));
    }

    #[test]
    fn test_command_args() {
        let args = AiProvider::Claude.command_args("hello");
        assert_eq!(args, vec!["-p", "hello", "--output-format", "text"]);
        assert_eq!(AiProvider::Codex.command_args("hi")[0], "exec");
        assert!(AiProvider::GeminiApi.requires_api_key());
        assert!(!AiProvider::Gemini.requires_api_key());
    }
}
