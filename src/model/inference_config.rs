//! モデルメタデータから推論に必要な情報を取り出す

use crate::model::model_metadata::ModelMetadata;

/// 推論用の設定（ラベルテーブルと入力サイズ）
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// 出力インデックス順のクラスラベル
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub image_size: usize,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            image_size: metadata.image_size as usize,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }
}
