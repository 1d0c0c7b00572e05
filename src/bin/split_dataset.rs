//! クラスフォルダ形式のデータセットを train/val に分割してコピーする

use anyhow::Result;
use clap::Parser;
use soil_classifier_lib::dataset::split_dataset;
use soil_classifier_lib::model::{AppConfig, CONFIG_ENV_VAR};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "split-dataset")]
#[command(about = "Split class folders into train/val subsets")]
struct Args {
    /// 設定ファイル
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// 分割元（クラスフォルダを含むディレクトリ）
    #[arg(long)]
    source: Option<PathBuf>,

    /// 出力先（train/ と val/ が作られる）
    #[arg(long)]
    target: Option<PathBuf>,

    /// 学習用に回す割合
    #[arg(long)]
    train_fraction: Option<f64>,

    /// シャッフル用シード
    #[arg(long)]
    seed: Option<u64>,

    /// ファイル名でソートせず、OSの列挙順のままシャッフルする
    #[arg(long)]
    no_sort: bool,

    /// ログレベル
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    soil_classifier_lib::init_logging(&args.log_level);

    let mut settings = AppConfig::load_or_default(args.config.as_deref()).split;
    if let Some(source) = args.source {
        settings.source = source;
    }
    if let Some(target) = args.target {
        settings.target = target;
    }
    if let Some(fraction) = args.train_fraction {
        settings.train_fraction = fraction;
    }
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if args.no_sort {
        settings.sort_listing = false;
    }

    tracing::info!(
        "分割開始: {} -> {} (train_fraction={}, seed={})",
        settings.source.display(),
        settings.target.display(),
        settings.train_fraction,
        settings.seed
    );

    match split_dataset(&settings) {
        Ok(report) => {
            tracing::info!("データセットの準備が完了しました: {}", settings.target.display());
            if !report.skipped.is_empty() {
                tracing::warn!("スキップしたクラス: {}", report.skipped.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("[{}] {}", e.error_code(), e);
            Err(e.into())
        }
    }
}
