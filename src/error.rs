use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`competitor-iq config --set-api-key YOUR_KEY` または環境変数 GEMINI_KEY で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    /// トピック判定のリトライ上限到達
    #[error("{message}")]
    Analysis { message: String, quota_exhausted: bool },

    /// 価格・期間抽出のリトライ上限到達
    #[error("{message}")]
    Extraction { message: String, quota_exhausted: bool },

    #[error("Sheet '{0}' not found in master workbook")]
    MissingSheet(String),

    #[error("Excel処理エラー: {0}")]
    Workbook(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] competitor_iq_common::Error),
}

impl AppError {
    /// クォータ枯渇による失敗か
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(
            self,
            AppError::Analysis { quota_exhausted: true, .. }
                | AppError::Extraction { quota_exhausted: true, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
