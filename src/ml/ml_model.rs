//! 機械学習モデルの共通定義
//!
//! 土壌画像分類用のCNNモデルと画像の前処理を提供します。

use anyhow::Result;
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::imageops::FilterType;
use std::path::Path;

/// 入力画像サイズの下限（3層の畳み込み後に1x1以上残るサイズ）
pub const MIN_IMAGE_SIZE: usize = 18;

/// 適応平均プーリング後の空間サイズ
const POOLED_SIZE: usize = 4;

/// 最終畳み込み層のチャネル数
const FEATURE_CHANNELS: usize = 128;

/// ImageNetの平均と標準偏差
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 224)]
    pub image_size: usize,
}

impl ModelConfig {
    /// 入力サイズとクラス数を検証する
    pub fn validate(&self) -> Result<()> {
        if self.image_size < MIN_IMAGE_SIZE {
            anyhow::bail!(
                "入力サイズが小さすぎます: {} (最小{}x{}が必要)",
                self.image_size,
                MIN_IMAGE_SIZE,
                MIN_IMAGE_SIZE
            );
        }
        if self.num_classes == 0 {
            anyhow::bail!("クラス数が0です");
        }
        Ok(())
    }

    /// モデルを初期化
    ///
    /// 事前に `validate` で入力サイズを確認しておくこと。
    pub fn init<B: Backend>(&self, device: &B::Device) -> SoilClassifier<B> {
        // 適応平均プーリングで空間サイズを固定するため、特徴次元は入力サイズに依存しない
        let d = FEATURE_CHANNELS * POOLED_SIZE * POOLED_SIZE;
        let d_half = d / 2;

        tracing::debug!(
            "[Model] 入力: {}x{}, 特徴次元 d: {}, FC1: {} -> {}, FC2: {} -> {}",
            self.image_size,
            self.image_size,
            d,
            d,
            d_half,
            d_half,
            self.num_classes
        );

        SoilClassifier {
            // Conv1: 3x3 (no padding, stride 1)
            conv1: Conv2dConfig::new([3, 32], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv3: Conv2dConfig::new([64, FEATURE_CHANNELS], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool3: AdaptiveAvgPool2dConfig::new([POOLED_SIZE, POOLED_SIZE]).init(),

            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(d, d_half).init(device),
            fc2: LinearConfig::new(d_half, self.num_classes).init(device),

            activation: Relu::new(),
        }
    }
}

/// 土壌画像分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 2層
/// - Conv 3x3 + ReLU + AdaptiveAvgPool (4x4)
/// - Flatten + Dropout
/// - FC: d -> d/2 + ReLU
/// - FC: d/2 -> num_classes
#[derive(Module, Debug)]
pub struct SoilClassifier<B: Backend> {
    conv1: Conv2d<B>,  // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>,  // 32 -> 64
    pool2: MaxPool2d,
    conv3: Conv2d<B>,  // 64 -> 128
    pool3: AdaptiveAvgPool2d,

    dropout: Dropout,
    fc1: Linear<B>,    // d -> d/2
    fc2: Linear<B>,    // d/2 -> num_classes

    activation: Relu,
}

impl<B: Backend> SoilClassifier<B> {
    /// 順伝播
    ///
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    /// - 戻り値: クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool3.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);
        let x = self.dropout.forward(x);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラス確率（softmax）[batch_size, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// モデルの重みをバイト列に変換（f32精度）
pub fn encode_weights<B: Backend, M: Module<B>>(model: M) -> Result<Vec<u8>> {
    Recorder::<B>::record(
        &BinBytesRecorder::<FullPrecisionSettings>::default(),
        model.into_record(),
        (),
    )
    .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// バイト列からモデルの重みを復元
pub fn decode_weights<B: Backend>(
    model: SoilClassifier<B>,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<SoilClassifier<B>> {
    let record = Recorder::<B>::load(
        &BinBytesRecorder::<FullPrecisionSettings>::default(),
        bytes,
        device,
    )
    .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
    Ok(model.load_record(record))
}

/// 画像を読み込み、リサイズして正規化
///
/// ImageNetの平均と標準偏差で正規化し、(C, H, W) の順で平坦化して返す。
pub fn load_and_normalize_image(path: &Path, image_size: usize) -> Result<Vec<f32>> {
    let img = image::open(path)?.to_rgb8();
    let size = image_size as u32;
    let img = if img.dimensions() == (size, size) {
        img
    } else {
        image::imageops::resize(&img, size, size, FilterType::Triangle)
    };

    let mut data = Vec::with_capacity(3 * image_size * image_size);
    for channel in 0..3 {
        for y in 0..size {
            for x in 0..size {
                let value = img.get_pixel(x, y)[channel] as f32 / 255.0;
                data.push((value - MEAN[channel]) / STD[channel]);
            }
        }
    }

    Ok(data)
}
