//! ローカルAI CLI（claude / codex / gemini）連携

use super::backend::ModelBackend;
use crate::ai_provider::AiProvider;
use crate::error::{AppError, Result};
use std::process::Command;
use tracing::debug;

pub struct CliBackend {
    provider: AiProvider,
    command: &'static str,
}

impl CliBackend {
    pub fn new(provider: AiProvider) -> Result<Self> {
        let command = provider.command_name().ok_or_else(|| {
            AppError::Config(format!("{:?} はCLIプロバイダではありません", provider))
        })?;
        Ok(Self { provider, command })
    }
}

impl ModelBackend for CliBackend {
    fn model_name(&self) -> &str {
        self.command
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let args = self.provider.command_args(prompt);

        // Windowsではcmd /c経由
        #[cfg(windows)]
        let output = Command::new("cmd")
            .arg("/c")
            .arg(self.command)
            .args(&args)
            .output()
            .map_err(|e| AppError::ApiCall(format!("{} CLI実行エラー: {}", self.command, e)))?;

        #[cfg(not(windows))]
        let output = Command::new(self.command)
            .args(&args)
            .output()
            .map_err(|e| AppError::ApiCall(format!("{} CLI実行エラー: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ApiCall(format!(
                "{} CLI failed (code {:?}): {}",
                self.command,
                output.status.code(),
                stderr
            )));
        }

        let response = String::from_utf8_lossy(&output.stdout).to_string();
        let preview: String = response.chars().take(500).collect();
        debug!("{} レスポンス: {}", self.command, preview);

        Ok(response)
    }
}
