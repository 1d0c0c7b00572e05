//! モデル推論機能

use anyhow::Result;
use burn::{backend::Wgpu, tensor::{backend::Backend, Tensor}};
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::WgpuDevice;
use std::path::Path;

use crate::ml::{decode_weights, load_and_normalize_image, ModelConfig, SoilClassifier};
use crate::model::{load_model_with_metadata, DeviceType, InferenceConfig};
use crate::predict::{Classifier, PredictError};

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: SoilClassifier<B>,
    config: InferenceConfig,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        let config = InferenceConfig::from_metadata(&metadata);

        let model_config = ModelConfig {
            num_classes: config.num_classes(),
            dropout: metadata.dropout,
            image_size: config.image_size,
        };
        model_config.validate()?;

        let model = decode_weights(model_config.init::<B>(&device), model_binary, &device)?;
        tracing::debug!(
            "モデルを読み込みました: {} ({} クラス, 入力 {}x{})",
            model_path.as_ref().display(),
            config.num_classes(),
            config.image_size,
            config.image_size
        );

        Ok(Self {
            model,
            config,
            device,
        })
    }

    /// 前処理済みの画像からクラス確率を計算
    pub fn classify_pixels(&self, image_data: &[f32]) -> Result<Vec<f32>> {
        let size = self.config.image_size;
        let tensor = Tensor::<B, 1>::from_floats(image_data, &self.device).reshape([1, 3, size, size]);

        self.model
            .probabilities(tensor)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))
    }

    /// 単一画像のクラス確率を計算
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<Vec<f32>> {
        let image_data = load_and_normalize_image(image_path.as_ref(), self.config.image_size)?;
        self.classify_pixels(&image_data)
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

impl<B: Backend> Classifier for InferenceEngine<B> {
    fn labels(&self) -> &[String] {
        &self.config.class_labels
    }

    fn probabilities(&self, image_path: &Path) -> Result<Vec<f32>, PredictError> {
        let image_data = load_and_normalize_image(image_path, self.config.image_size)
            .map_err(|e| PredictError::ImageDecode(format!("{}: {}", image_path.display(), e)))?;
        self.classify_pixels(&image_data)
            .map_err(|e| PredictError::Inference(e.to_string()))
    }
}

/// 設定されたデバイスで推論エンジンを読み込む
///
/// CPU指定時は NdArray、それ以外は WGPU バックエンドを使う。
pub fn load_classifier(model_path: &Path, device_type: DeviceType) -> Result<Box<dyn Classifier>, PredictError> {
    let loaded: Result<Box<dyn Classifier>> = match device_type {
        DeviceType::Cpu => InferenceEngine::<NdArray<f32>>::load(model_path, NdArrayDevice::Cpu)
            .map(|engine| Box::new(engine) as Box<dyn Classifier>),
        DeviceType::Wgpu => InferenceEngine::<Wgpu>::load(model_path, WgpuDevice::default())
            .map(|engine| Box::new(engine) as Box<dyn Classifier>),
    };
    loaded.map_err(|e| PredictError::ModelLoad(format!("{}: {:#}", model_path.display(), e)))
}
