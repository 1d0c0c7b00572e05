//! 画像1枚を分類し、結果をJSON1行で標準出力に書き出す
//!
//! 終了コードは常に0。成功・失敗はすべて標準出力のJSONで伝える。

use clap::Parser;
use soil_classifier_lib::model::{AppConfig, DeviceType, CONFIG_ENV_VAR};
use soil_classifier_lib::predict::{
    run, Classifier, OutputGuard, PredictError, Prediction, PredictionOutput,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "predict")]
#[command(about = "Classify one soil image and print a single JSON line")]
struct Args {
    /// 分類する画像のパス
    images: Vec<PathBuf>,

    /// 設定ファイル
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// モデルアーティファクト（設定の modelPath より優先）
    #[arg(long)]
    model: Option<PathBuf>,

    /// 推論デバイス (wgpu | cpu)
    #[arg(long)]
    device: Option<DeviceType>,

    /// ログレベル（標準エラー出力）
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let guard = OutputGuard::new(std::io::stdout());

    let outcome = std::panic::catch_unwind(predict_from_args)
        .unwrap_or_else(|_| Err(PredictError::Inference("panic: unexpected failure".to_string())));

    if let Err(e) = &outcome {
        tracing::warn!("{}", e.reason());
    }
    let _ = guard.emit(&PredictionOutput::from(outcome));
}

fn predict_from_args() -> Result<Prediction, PredictError> {
    let args = Args::try_parse().map_err(|e| {
        eprintln!("{}", e);
        let summary = e.to_string().lines().next().unwrap_or_default().to_string();
        PredictError::InvalidArguments(summary)
    })?;

    soil_classifier_lib::init_logging(&args.log_level);

    // 画像パスはちょうど1つ。それ以外は引数なしと同じ扱い
    let image_path = match args.images.as_slice() {
        [single] => Some(single.clone()),
        other => {
            if !other.is_empty() {
                tracing::warn!("画像パスは1つだけ指定してください（{} 個指定）", other.len());
            }
            None
        }
    };

    let config = AppConfig::load_or_default(args.config.as_deref());
    let model_path = args
        .model
        .unwrap_or_else(|| config.resolve_model_path(&exe_dir()));
    let device = args.device.unwrap_or(config.device_type);

    run(image_path, || load_model(&model_path, device))
}

/// 実行ファイルのあるディレクトリ
fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(feature = "ml")]
fn load_model(model_path: &Path, device: DeviceType) -> Result<Box<dyn Classifier>, PredictError> {
    tracing::debug!("モデル読み込み: {} ({})", model_path.display(), device);
    soil_classifier_lib::ml::load_classifier(model_path, device)
}

#[cfg(not(feature = "ml"))]
fn load_model(model_path: &Path, _device: DeviceType) -> Result<Box<dyn Classifier>, PredictError> {
    Err(PredictError::ModelLoad(format!(
        "{}: built without the ml feature",
        model_path.display()
    )))
}
