use clap::{Parser, Subcommand};
use crate::ai_provider::AiProvider;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "competitor-iq")]
#[command(about = "競合コースのトピック網羅分析・マスタExcel同期ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// AIプロバイダ (gemini-api/claude/codex/gemini)。省略時は設定ファイル、なければ gemini-api
    #[arg(long, global = true)]
    pub ai_provider: Option<AiProvider>,

    /// プロンプトと生レスポンスの保存先
    #[arg(long, global = true)]
    pub trace_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 競合コースを分析してマスタExcelに反映
    Analyze {
        /// 競合コースの本文（抽出済みテキストファイル）
        #[arg(required = true)]
        evidence: PathBuf,

        /// マスタExcel
        #[arg(short, long)]
        master: PathBuf,

        /// 出力Excel（マスタとは別のパス）
        #[arg(short, long)]
        output: PathBuf,

        /// 競合名（Provider）
        #[arg(short, long)]
        competitor: String,

        /// コース名
        #[arg(long)]
        course: Option<String>,

        /// コースのURL
        #[arg(long)]
        link: Option<String>,

        /// トピック一覧JSON（省略時はマスタのComparisonシートから生成）
        #[arg(short, long)]
        topics: Option<PathBuf>,

        /// 価格・期間抽出用の本文（省略時は evidence）
        #[arg(long)]
        price_source: Option<PathBuf>,

        /// 価格・期間の抽出をしない
        #[arg(long)]
        no_price: bool,

        /// 判定結果JSONの保存先（後で `sync` に渡せる）
        #[arg(long)]
        decisions_out: Option<PathBuf>,

        /// Geminiモデル
        #[arg(long)]
        model: Option<String>,

        /// Gemini APIキー
        #[arg(long)]
        api_key: Option<String>,
    },

    /// 保存済みの判定結果JSONをマスタExcelに反映（モデル呼び出しなし）
    Sync {
        /// 判定結果JSON（[{topic, decision, reasoning}]）
        #[arg(required = true)]
        decisions: PathBuf,

        /// マスタExcel
        #[arg(short, long)]
        master: PathBuf,

        /// 出力Excel
        #[arg(short, long)]
        output: PathBuf,

        /// 競合名（Provider）
        #[arg(short, long)]
        competitor: String,

        /// コース名
        #[arg(long)]
        course: Option<String>,

        /// コースのURL
        #[arg(long)]
        link: Option<String>,

        /// 価格シートに書くフィールドJSON（{"Price": "$999", ...}）
        #[arg(long)]
        fields: Option<PathBuf>,
    },

    /// マスタExcelからトピック一覧JSONを生成
    Topics {
        /// マスタExcel
        #[arg(required = true)]
        master: PathBuf,

        /// 出力JSON（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// マスタExcelの価格シートからカラム一覧JSONを生成
    Columns {
        /// マスタExcel
        #[arg(required = true)]
        master: PathBuf,

        /// 出力JSON（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 本文から価格・期間などを抽出してJSONを出力
    Price {
        /// 本文テキストファイル
        #[arg(required = true)]
        input: PathBuf,

        /// カラム一覧JSON（`columns` の出力）
        #[arg(long, conflicts_with = "master")]
        columns: Option<PathBuf>,

        /// カラム一覧を読むマスタExcel
        #[arg(short, long)]
        master: Option<PathBuf>,

        /// 情報元（URLなど）
        #[arg(long, default_value = "")]
        source: String,

        /// 出力JSON（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Geminiモデル
        #[arg(long)]
        model: Option<String>,

        /// Gemini APIキー
        #[arg(long)]
        api_key: Option<String>,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 既定のGeminiモデルを設定
        #[arg(long)]
        set_model: Option<String>,

        /// 既定のAIプロバイダを設定
        #[arg(long)]
        set_provider: Option<AiProvider>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "competitor-iq",
            "analyze",
            "course.txt",
            "--master",
            "master.xlsx",
            "-o",
            "master_v2.xlsx",
            "-c",
            "Acme",
            "--course",
            "GenAI Pro",
            "--ai-provider",
            "claude",
        ])
        .unwrap();

        assert_eq!(cli.ai_provider, Some(AiProvider::Claude));
        match cli.command {
            Commands::Analyze { competitor, course, no_price, .. } => {
                assert_eq!(competitor, "Acme");
                assert_eq!(course.as_deref(), Some("GenAI Pro"));
                assert!(!no_price);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_price_columns_conflict_with_master() {
        let result = Cli::try_parse_from([
            "competitor-iq",
            "price",
            "page.txt",
            "--columns",
            "columns.json",
            "--master",
            "master.xlsx",
        ]);
        assert!(result.is_err());
    }
}
