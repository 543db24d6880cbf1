use anyhow::{bail, Context};
use clap::Parser;
use competitor_iq::{analyzer, cli, config, inputs, sync, workbook, writer};
use competitor_iq_common::{reconcile, FieldMap, Reconciliation};
use analyzer::{build_backend, Analyzer, ThreadSleeper};
use cli::{Cli, Commands};
use config::Config;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use writer::{DocumentUpdate, RowOutcome, RowUpdate};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// 出力先がマスタ自身でないことを確認する
fn ensure_separate_output(master: &Path, output: &Path) -> anyhow::Result<()> {
    let same = match (master.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => master == output,
    };
    if same {
        bail!("出力先がマスタExcelと同じです: {}", output.display());
    }
    Ok(())
}

fn print_reconciliation(reconciliation: &Reconciliation) {
    let report = &reconciliation.report;
    let (yes, no, unsure) = reconciliation.decisions.counts();
    println!("✔ Matched {}/{} topics (Yes {} / No {} / Unsure {})", report.matched, report.total, yes, no, unsure);
    for topic in &report.unmatched {
        println!("  ⚠ 未照合のトピック: {}", topic);
    }
}

fn print_update(update: &DocumentUpdate, output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, &update.bytes)
        .with_context(|| format!("書き込みに失敗: {}", output.display()))?;

    let column = &update.column;
    println!(
        "✔ 列 {} を{} ({}行)",
        column.column,
        if column.created { "追加" } else { "更新" },
        column.rows_written
    );
    match &update.row {
        RowOutcome::Synced(row) => {
            println!(
                "✔ 価格シート {}行目を{} ({}項目)",
                row.row,
                if row.created { "追加" } else { "更新" },
                row.fields_written
            );
            for field in &row.unmapped_fields {
                println!("  ⚠ 列が見つからない項目: {}", field);
            }
        }
        RowOutcome::Skipped { reason } => println!("- 価格シートはスキップ: {}", reason),
        RowOutcome::Failed { error } => println!("⚠ 価格シートの更新に失敗: {}", error),
    }
    println!("✔ 保存: {}", output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load()?;
    let provider = config.resolve_provider(cli.ai_provider);
    let trace_dir = cli.trace_dir.clone().or_else(|| config.trace_dir.clone());

    match cli.command {
        Commands::Analyze {
            evidence,
            master,
            output,
            competitor,
            course,
            link,
            topics,
            price_source,
            no_price,
            decisions_out,
            model,
            api_key,
        } => {
            println!("🔍 competitor-iq - 競合コース分析\n");
            ensure_separate_output(&master, &output)?;

            // 1. 入力
            println!("[1/4] マスタと本文を読み込み中...");
            let mut document = workbook::load_workbook_file(&master)
                .with_context(|| format!("マスタの読み込みに失敗: {}", master.display()))?;
            let topics = match topics {
                Some(path) => inputs::read_topics(&path)?,
                None => sync::collect_topics(&document)?,
            };
            let content = inputs::read_evidence(&evidence)?;
            println!("✔ {}件のトピック / 本文{}文字\n", topics.len(), content.chars().count());

            // 2. トピック判定
            println!("[2/4] AI判定中... ({})", provider.as_str());
            let backend = build_backend(provider, &config, api_key.as_deref(), model.as_deref())?;
            let analyzer = Analyzer::new(backend.as_ref(), &ThreadSleeper).with_trace_dir(trace_dir);
            let reconciliation = analyzer.classify_topics(&topics, &content)?;
            print_reconciliation(&reconciliation);
            if let Some(path) = decisions_out {
                inputs::write_json(&reconciliation.decisions.to_records(), Some(&path))?;
                println!("✔ 判定結果を保存: {}", path.display());
            }
            println!();

            // 3. 価格・期間
            let fields = if no_price {
                println!("[3/4] 価格・期間の抽出はスキップ\n");
                FieldMap::new()
            } else {
                println!("[3/4] 価格・期間を抽出中...");
                match sync::price_columns(&document) {
                    Ok(schema) => {
                        let text = match &price_source {
                            Some(path) => inputs::read_evidence(path)?,
                            None => content.clone(),
                        };
                        let fields = analyzer.extract_price_duration(
                            link.as_deref().unwrap_or(""),
                            &schema.extraction_fields(),
                            &text,
                        )?;
                        println!("✔ {}項目を抽出\n", fields.len());
                        fields
                    }
                    Err(e) => {
                        println!("- {}（抽出をスキップ）\n", e);
                        FieldMap::new()
                    }
                }
            };

            // 4. マスタへ反映
            println!("[4/4] マスタExcelに反映中...");
            let label = sync::competitor_label(&competitor, course.as_deref());
            let row = RowUpdate {
                identity: sync::CompetitorIdentity::new(
                    competitor.trim(),
                    course.unwrap_or_default(),
                    link.unwrap_or_default(),
                ),
                fields,
            };
            let update = writer::write_document(&mut document, &label, &reconciliation.decisions, Some(&row))?;
            print_update(&update, &output)?;

            println!("\n✅ 分析完了");
        }

        Commands::Sync {
            decisions,
            master,
            output,
            competitor,
            course,
            link,
            fields,
        } => {
            println!("📝 competitor-iq - 判定結果の反映\n");
            ensure_separate_output(&master, &output)?;

            let mut document = workbook::load_workbook_file(&master)
                .with_context(|| format!("マスタの読み込みに失敗: {}", master.display()))?;
            let topics = sync::collect_topics(&document)?;
            let records = inputs::read_decisions(&decisions)?;
            let reconciliation = reconcile(&topics, &records);
            print_reconciliation(&reconciliation);

            let fields = match fields {
                Some(path) => inputs::read_fields(&path)?,
                None => FieldMap::new(),
            };
            let label = sync::competitor_label(&competitor, course.as_deref());
            let row = RowUpdate {
                identity: sync::CompetitorIdentity::new(
                    competitor.trim(),
                    course.unwrap_or_default(),
                    link.unwrap_or_default(),
                ),
                fields,
            };
            let update = writer::write_document(&mut document, &label, &reconciliation.decisions, Some(&row))?;
            print_update(&update, &output)?;

            println!("\n✅ 反映完了");
        }

        Commands::Topics { master, output } => {
            let document = workbook::load_workbook_file(&master)?;
            let topics = sync::collect_topics(&document)?;
            inputs::write_json(&topics, output.as_deref())?;
            if let Some(path) = output {
                println!("✔ {}件のトピックを保存: {}", topics.len(), path.display());
            }
        }

        Commands::Columns { master, output } => {
            let document = workbook::load_workbook_file(&master)?;
            let schema = sync::price_columns(&document)?;
            inputs::write_json(schema.headers(), output.as_deref())?;
            if let Some(path) = output {
                println!("✔ {}列を保存: {}", schema.headers().len(), path.display());
            }
        }

        Commands::Price {
            input,
            columns,
            master,
            source,
            output,
            model,
            api_key,
        } => {
            let schema = match (columns, master) {
                (Some(path), _) => inputs::read_columns(&path)?,
                (None, Some(path)) => sync::price_columns(&workbook::load_workbook_file(&path)?)?,
                (None, None) => bail!("--columns または --master を指定してください"),
            };
            let text = inputs::read_evidence(&input)?;

            let backend = build_backend(provider, &config, api_key.as_deref(), model.as_deref())?;
            let analyzer = Analyzer::new(backend.as_ref(), &ThreadSleeper).with_trace_dir(trace_dir);
            let fields = analyzer.extract_price_duration(&source, &schema.extraction_fields(), &text)?;
            inputs::write_json(&fields, output.as_deref())?;
            if let Some(path) = output {
                println!("✔ {}項目を保存: {}", fields.len(), path.display());
            }
        }

        Commands::Config {
            set_api_key,
            set_model,
            set_provider,
            show,
        } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if let Some(model) = set_model {
                config.set_model(model)?;
                println!("✔ モデルを設定しました");
            }

            if let Some(provider) = set_provider {
                config.set_provider(provider)?;
                println!("✔ AIプロバイダを設定しました");
            }

            if show {
                println!("設定: {}", Config::config_path()?.display());
                println!("  モデル: {}", config.resolve_model(None));
                println!("  AIプロバイダ: {}", config.resolve_provider(None).as_str());
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  APIキー: {}", if config.get_api_key(None).is_ok() { "設定済み" } else { "未設定" });
                if let Some(dir) = &config.trace_dir {
                    println!("  トレース: {}", dir.display());
                }
            }
        }
    }

    Ok(())
}
