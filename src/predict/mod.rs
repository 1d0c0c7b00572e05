//! 単一画像推論の出力契約
//!
//! 呼び出し元プロセスは標準出力の最後の1行だけをJSONとして読むため、
//! どの経路で終了しても必ず1行だけ書き出します。

mod output;

pub use output::{OutputGuard, PredictionOutput};

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 推論時のエラー
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("no image path supplied")]
    NoImagePath,

    #[error("{0}")]
    InvalidArguments(String),

    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("{0}")]
    ModelLoad(String),

    #[error("{0}")]
    ImageDecode(String),

    #[error("{0}")]
    Inference(String),
}

impl PredictError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PredictError::NoImagePath => "no_image_path",
            PredictError::InvalidArguments(_) => "invalid_arguments",
            PredictError::ImageNotFound(_) => "image_not_found",
            PredictError::ModelLoad(_) => "model_load_failed",
            PredictError::ImageDecode(_) => "image_decode_failed",
            PredictError::Inference(_) => "inference_failure",
        }
    }

    /// JSONの `error` フィールドに書く文字列
    ///
    /// 引数なしの場合はコードのみ、それ以外は `<code>: <detail>`。
    pub fn reason(&self) -> String {
        match self {
            PredictError::NoImagePath => self.error_code().to_string(),
            other => format!("{}: {}", other.error_code(), other),
        }
    }
}

/// Top-1 予測結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// ラベルテーブル上のインデックス（JSON には出さない）
    #[serde(skip)]
    pub index: usize,
    #[serde(rename = "soilType")]
    pub soil_type: String,
    pub confidence: f32,
}

/// 読み込み済みモデルのハンドル
///
/// プロセス起動時に1回だけ構築し、推論関数に渡す。
pub trait Classifier {
    /// 出力インデックス順のクラスラベル
    fn labels(&self) -> &[String];

    /// 画像1枚のクラス確率（`labels()` と同じ順序）
    fn probabilities(&self, image_path: &Path) -> Result<Vec<f32>, PredictError>;
}

/// 確率分布から最大のクラスを選び、ラベルに変換する
pub fn top1(probabilities: &[f32], labels: &[String]) -> Result<Prediction, PredictError> {
    let (index, &confidence) = probabilities
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| PredictError::Inference("model returned no scores".to_string()))?;

    if !confidence.is_finite() {
        return Err(PredictError::Inference(format!(
            "non-finite confidence {} for class index {}",
            confidence, index
        )));
    }

    let soil_type = labels.get(index).cloned().ok_or_else(|| {
        PredictError::Inference(format!(
            "class index {} is out of range for {} labels",
            index,
            labels.len()
        ))
    })?;

    Ok(Prediction {
        index,
        soil_type,
        confidence: confidence.clamp(0.0, 1.0),
    })
}

/// 画像1枚を分類する。ライブラリ内部のpanicもエラーとして返す
pub fn predict_image(classifier: &dyn Classifier, image_path: &Path) -> Result<Prediction, PredictError> {
    if !image_path.is_file() {
        return Err(PredictError::ImageNotFound(image_path.to_path_buf()));
    }

    let probabilities = catch_panic(|| classifier.probabilities(image_path))
        .map_err(PredictError::Inference)??;

    let prediction = top1(&probabilities, classifier.labels())?;
    tracing::debug!(
        "予測: {} ({:.2}%)",
        prediction.soil_type,
        prediction.confidence * 100.0
    );
    Ok(prediction)
}

/// 引数の検証・モデル読み込み・推論をまとめて行う
///
/// `load_model` は画像パスの検証が済んでから1回だけ呼ばれる。
pub fn run<F>(image_path: Option<PathBuf>, load_model: F) -> Result<Prediction, PredictError>
where
    F: FnOnce() -> Result<Box<dyn Classifier>, PredictError>,
{
    let image_path = image_path.ok_or(PredictError::NoImagePath)?;
    if !image_path.is_file() {
        return Err(PredictError::ImageNotFound(image_path));
    }

    let classifier = catch_panic(load_model).map_err(PredictError::ModelLoad)??;
    predict_image(classifier.as_ref(), &image_path)
}

/// panicを捕まえてメッセージに変換する
fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("panic: {}", message)
    })
}
