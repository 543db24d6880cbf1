//! モデル呼び出しの抽象化

use crate::error::Result;

/// プロンプトを受け取り、モデルの生レスポンス本文を返す
pub trait ModelBackend {
    /// ログ・エラーメッセージ用のモデル名
    fn model_name(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;
}
