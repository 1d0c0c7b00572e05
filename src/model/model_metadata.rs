//! モデルメタデータの定義
//!
//! 重みと同じ tar.gz に `metadata.json` として保存され、
//! 出力インデックスからクラスラベルへの対応表（ラベルテーブル）を保持します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    /// クラスラベル。`class_labels[i]` が出力インデックス `i` のラベル
    /// 例: ["Alluvial soil", "Black Soil", "Clay soil", "Red soil", "Sandy soil"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形）
    pub image_size: u32,

    /// ドロップアウト率（モデル構築時に必要）
    #[serde(default)]
    pub dropout: f64,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 学習に使ったデバイス
    #[serde(default)]
    pub device: String,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        class_labels: Vec<String>,
        image_size: u32,
        dropout: f64,
        num_epochs: u32,
        device: impl Into<String>,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels,
            image_size,
            dropout,
            num_epochs,
            device: device.into(),
            trained_at,
        }
    }

    /// クラス数
    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
