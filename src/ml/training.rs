//! モデル学習
//!
//! 分割済みデータセット（`<data>/train/<class>`, `<data>/val/<class>`）から
//! 分類モデルを学習し、`<project>/<name>/weights/<artifact>` に保存します。

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, Wgpu},
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::Module,
    tensor::{backend::Backend, Int, Tensor},
};
use burn_wgpu::WgpuDevice;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::dataset::is_image_file;
use crate::ml::{encode_weights, load_and_normalize_image, ModelConfig, SoilClassifier};
use crate::model::{save_model_with_metadata, DeviceType, ModelMetadata, TrainingSettings};

/// 学習データセット（パスのリストのみ保持）
pub struct ImageFolderDataset {
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
}

impl ImageFolderDataset {
    /// 指定された順序でクラスディレクトリから画像を読み込む
    ///
    /// 存在しないクラスディレクトリは警告してスキップする。
    pub fn from_directory_with_order(data_dir: &Path, class_order: &[String]) -> Result<Self> {
        let mut samples = Vec::new();

        for (class_id, class_name) in class_order.iter().enumerate() {
            let class_dir = data_dir.join(class_name);
            if !class_dir.is_dir() {
                tracing::warn!("クラスディレクトリが存在しません: {}", class_dir.display());
                continue;
            }

            let mut paths = Vec::new();
            for entry in std::fs::read_dir(&class_dir)
                .with_context(|| format!("Failed to read {}", class_dir.display()))?
            {
                let path = entry?.path();
                if path.is_file() && is_image_file(&path) {
                    paths.push(path);
                }
            }
            paths.sort();
            samples.extend(paths.into_iter().map(|p| (p, class_id)));
        }

        Ok(Self {
            samples,
            class_names: class_order.to_vec(),
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスごとの枚数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for (_, id) in &self.samples {
            counts[*id] += 1;
        }
        counts
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let (path, label) = self.samples.get(index)?;
        Some(ImageItem {
            path: path.clone(),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// `<data>/train` のサブディレクトリ名をソートしてクラス順序とする
pub fn discover_classes(train_dir: &Path) -> Result<Vec<String>> {
    if !train_dir.is_dir() {
        anyhow::bail!("学習用ディレクトリが存在しません: {}", train_dir.display());
    }

    let mut classes = Vec::new();
    for entry in std::fs::read_dir(train_dir)
        .with_context(|| format!("Failed to read {}", train_dir.display()))?
    {
        let entry = entry?;
        if entry.path().is_dir() {
            let name = entry
                .file_name()
                .into_string()
                .map_err(|n| anyhow::anyhow!("Invalid directory name: {:?}", n))?;
            classes.push(name);
        }
    }
    classes.sort();

    if classes.is_empty() {
        anyhow::bail!("クラスディレクトリがありません: {}", train_dir.display());
    }
    Ok(classes)
}

/// バッチャー
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    image_size: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            match load_and_normalize_image(&item.path, size) {
                Ok(image_data) => all_pixels.extend_from_slice(&image_data),
                Err(e) => {
                    tracing::warn!("画像読み込み失敗 {}: {}", item.path.display(), e);
                    // エラーの場合はゼロで埋める
                    all_pixels.extend(std::iter::repeat(0.0f32).take(3 * size * size));
                }
            }
            targets_vec.push(item.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), device)
            .reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        ImageBatch { images, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: burn::tensor::backend::AutodiffBackend>
    burn::train::TrainStep<ImageBatch<B>, burn::train::ClassificationOutput<B>> for SoilClassifier<B>
{
    fn step(&self, batch: ImageBatch<B>) -> burn::train::TrainOutput<burn::train::ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        burn::train::TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> burn::train::ValidStep<ImageBatch<B>, burn::train::ClassificationOutput<B>>
    for SoilClassifier<B>
{
    fn step(&self, batch: ImageBatch<B>) -> burn::train::ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 学習結果の概要
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub artifact_path: PathBuf,
    pub class_labels: Vec<String>,
    pub train_samples: usize,
    pub val_samples: usize,
}

/// 学習前の準備（クラス列挙とデータセット構築）
///
/// 学習用画像が1枚もない場合はエラー。
pub fn prepare_datasets(
    settings: &TrainingSettings,
) -> Result<(Vec<String>, ImageFolderDataset, ImageFolderDataset)> {
    let train_dir = settings.data.join("train");
    let val_dir = settings.data.join("val");

    let class_labels = discover_classes(&train_dir)?;
    tracing::info!("全クラス ({}個): {}", class_labels.len(), class_labels.join(", "));

    let dataset_train = ImageFolderDataset::from_directory_with_order(&train_dir, &class_labels)?;
    let dataset_val = ImageFolderDataset::from_directory_with_order(&val_dir, &class_labels)?;

    let train_counts = dataset_train.class_counts();
    let val_counts = dataset_val.class_counts();
    for (i, name) in class_labels.iter().enumerate() {
        tracing::info!("  クラス '{}': 学習 {} 枚 / 検証 {} 枚", name, train_counts[i], val_counts[i]);
    }

    if dataset_train.is_empty() {
        anyhow::bail!("学習データが見つかりません: {}", train_dir.display());
    }
    if dataset_val.is_empty() {
        tracing::warn!("検証データがありません: {}", val_dir.display());
    }

    Ok((class_labels, dataset_train, dataset_val))
}

/// モデル学習を実行
/// 学習設定からアーティファクトのメタデータを作る。u32 に収まらない値はエラー
fn build_metadata(
    settings: &TrainingSettings,
    class_labels: &[String],
    device_type: DeviceType,
) -> Result<ModelMetadata> {
    let image_size = u32::try_from(settings.image_size)
        .with_context(|| format!("image size {} does not fit in u32", settings.image_size))?;
    let num_epochs = u32::try_from(settings.num_epochs)
        .with_context(|| format!("epoch count {} does not fit in u32", settings.num_epochs))?;

    Ok(ModelMetadata::new(
        class_labels.to_vec(),
        image_size,
        settings.dropout,
        num_epochs,
        device_type.to_string(),
    ))
}

pub fn train_model(settings: &TrainingSettings, device_type: DeviceType) -> Result<TrainingSummary> {
    use burn::{
        data::dataloader::DataLoaderBuilder,
        optim::AdamConfig,
        train::{
            metric::{AccuracyMetric, LossMetric},
            LearnerBuilder, LearningStrategy,
        },
    };

    let (class_labels, dataset_train, dataset_val) = prepare_datasets(settings)?;
    let train_samples = dataset_train.len();
    let val_samples = dataset_val.len();

    let model_config = ModelConfig {
        num_classes: class_labels.len(),
        dropout: settings.dropout,
        image_size: settings.image_size,
    };
    model_config.validate()?;
    let metadata = build_metadata(settings, &class_labels, device_type)?;

    tracing::info!(
        "モデル設定: {} クラス, 入力サイズ: {}x{}, dropout={}",
        model_config.num_classes,
        model_config.image_size,
        model_config.image_size,
        model_config.dropout
    );

    let device = match device_type {
        DeviceType::Wgpu => WgpuDevice::default(),
        DeviceType::Cpu => WgpuDevice::Cpu,
    };
    tracing::info!("使用デバイス: {} ({:?})", device_type, device);

    let batcher_train = ImageBatcher::<Autodiff<Wgpu>>::new(settings.image_size);
    let batcher_val = ImageBatcher::<Wgpu>::new(settings.image_size);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(0)
        .build(dataset_train);

    let dataloader_val = DataLoaderBuilder::new(batcher_val)
        .batch_size(settings.batch_size)
        .num_workers(0)
        .build(dataset_val);

    let model = model_config.init::<Autodiff<Wgpu>>(&device);

    let run_dir = settings.run_dir();
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create {}", run_dir.display()))?;
    let run_dir_str = run_dir.to_string_lossy().to_string();

    tracing::info!(
        "学習を開始します: エポック数 {}, バッチサイズ {}, 学習率 {}",
        settings.num_epochs,
        settings.batch_size,
        settings.learning_rate
    );

    let learner = LearnerBuilder::new(&run_dir_str)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_val);
    let trained_model = model_trained.model;

    let total_params = trained_model.num_params();
    tracing::info!(
        "学習完了: パラメータ数 {} ({:.2}M)",
        total_params,
        total_params as f64 / 1_000_000.0
    );

    let model_binary = encode_weights(trained_model)?;

    let artifact_path = settings.artifact_path();
    save_model_with_metadata(&artifact_path, &metadata, &model_binary)?;
    tracing::info!(
        "モデルを保存しました: {} ({:.2} MB)",
        artifact_path.display(),
        model_binary.len() as f64 / 1024.0 / 1024.0
    );

    Ok(TrainingSummary {
        artifact_path,
        class_labels,
        train_samples,
        val_samples,
    })
}
