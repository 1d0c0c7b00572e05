//! 分割済みデータセットで分類モデルを学習する

use anyhow::{Context, Result};
use clap::Parser;
use soil_classifier_lib::ml::train_model;
use soil_classifier_lib::model::{AppConfig, DeviceType, CONFIG_ENV_VAR};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "soil-train")]
#[command(about = "Train the soil image classifier on a train/val split")]
struct Args {
    /// 設定ファイル
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// 分割済みデータセット（train/ と val/ を含む）
    #[arg(long)]
    data: Option<PathBuf>,

    /// エポック数
    #[arg(long)]
    epochs: Option<usize>,

    /// 入力画像サイズ
    #[arg(long)]
    image_size: Option<usize>,

    /// 計算デバイス (wgpu | cpu)
    #[arg(long)]
    device: Option<DeviceType>,

    /// 出力プロジェクトディレクトリ
    #[arg(long)]
    project: Option<PathBuf>,

    /// 実行名
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// ログレベル
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    soil_classifier_lib::init_logging(&args.log_level);

    let config = AppConfig::load_or_default(args.config.as_deref());
    let mut settings = config.training;
    if let Some(data) = args.data {
        settings.data = data;
    }
    if let Some(epochs) = args.epochs {
        settings.num_epochs = epochs;
    }
    if let Some(size) = args.image_size {
        settings.image_size = size;
    }
    if let Some(project) = args.project {
        settings.project = project;
    }
    if let Some(name) = args.name {
        settings.name = name;
    }
    if let Some(batch_size) = args.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(lr) = args.learning_rate {
        settings.learning_rate = lr;
    }
    let device = args.device.unwrap_or(config.device_type);

    let summary = train_model(&settings, device)
        .with_context(|| format!("training on {} failed", settings.data.display()))?;

    tracing::info!(
        "学習完了: {} クラス, 学習 {} 枚, 検証 {} 枚 -> {}",
        summary.class_labels.len(),
        summary.train_samples,
        summary.val_samples,
        summary.artifact_path.display()
    );
    Ok(())
}
