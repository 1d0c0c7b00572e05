//! アプリケーション設定管理モジュール
//!
//! データセット分割・学習・推論の設定をJSON形式で保存・読み込みします。
//! キーは camelCase（`source`, `target`, `modelPath`, `seed`, `trainFraction` など）。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 設定ファイルのパスを上書きする環境変数
pub const CONFIG_ENV_VAR: &str = "SOIL_CONFIG";

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// CPU バックエンド
    Cpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Wgpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    /// `cuda` / `gpu` は学習スクリプト由来の指定なので `wgpu` として扱う
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" | "cuda" => Ok(DeviceType::Wgpu),
            "cpu" => Ok(DeviceType::Cpu),
            other => Err(format!("unknown device: {other} (expected wgpu or cpu)")),
        }
    }
}

/// データセット分割設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitSettings {
    /// クラスフォルダを含む元データセット
    pub source: PathBuf,
    /// `train/` と `val/` を作成する出力先
    pub target: PathBuf,
    /// 学習用に回す割合（0.0〜1.0）
    pub train_fraction: f64,
    /// シャッフル用シード
    pub seed: u64,
    /// シャッフル前にファイル名でソートするか
    pub sort_listing: bool,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            source: PathBuf::from("soil_types_dataset"),
            target: PathBuf::from("soil_cls"),
            train_fraction: 0.8,
            seed: 42,
            sort_listing: true,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingSettings {
    /// 分割済みデータセットのルート（`train/`, `val/` を含む）
    pub data: PathBuf,
    /// エポック数
    pub num_epochs: usize,
    /// 入力画像サイズ（正方形）
    pub image_size: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ドロップアウト率
    pub dropout: f64,
    /// データローダーのシャッフル用シード
    pub seed: u64,
    /// 出力プロジェクトディレクトリ
    pub project: PathBuf,
    /// 実行名（`<project>/<name>/weights/` に保存される）
    pub name: String,
    /// 重みアーティファクトのファイル名
    pub artifact_name: String,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            data: PathBuf::from("soil_cls"),
            num_epochs: 15,
            image_size: 224,
            batch_size: 16,
            learning_rate: 1e-3,
            dropout: 0.5,
            seed: 42,
            project: PathBuf::from("."),
            name: "soil_training".to_string(),
            artifact_name: "model.tar.gz".to_string(),
        }
    }
}

impl TrainingSettings {
    /// 学習ログなどを置く実行ディレクトリ
    pub fn run_dir(&self) -> PathBuf {
        self.project.join(&self.name)
    }

    /// 学習結果の重みディレクトリ
    pub fn weights_dir(&self) -> PathBuf {
        self.run_dir().join("weights")
    }

    /// 学習結果のアーティファクトパス
    pub fn artifact_path(&self) -> PathBuf {
        self.weights_dir().join(&self.artifact_name)
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// 分割設定
    #[serde(flatten)]
    pub split: SplitSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// 推論に使うモデルのパス。未指定なら実行ファイルからの相対位置を使う
    pub model_path: Option<PathBuf>,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("soil_config.json"))
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パス（なければデフォルトパス）から設定を読み込む。存在しない場合はデフォルト設定を返す
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if path.exists() {
            match Self::load(&path) {
                Ok(config) => {
                    tracing::debug!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 推論用モデルのパスを解決する
    ///
    /// 設定に `modelPath` があればそれを、なければ
    /// `<実行ファイルのディレクトリ>/../<name>/weights/<artifact_name>` を返す。
    pub fn resolve_model_path(&self, exe_dir: &Path) -> PathBuf {
        match &self.model_path {
            Some(path) => path.clone(),
            None => exe_dir
                .join("..")
                .join(&self.training.name)
                .join("weights")
                .join(&self.training.artifact_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.split.seed, 42);
        assert!((config.split.train_fraction - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.training.num_epochs, 15);
        assert_eq!(config.training.image_size, 224);
        assert!(config.model_path.is_none());
    }

    #[test]
    fn test_recognized_camel_case_options() {
        let json = r#"{
            "source": "raw",
            "target": "out",
            "trainFraction": 0.5,
            "seed": 7,
            "modelPath": "weights/m.tar.gz",
            "deviceType": "cpu"
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.split.source, PathBuf::from("raw"));
        assert_eq!(config.split.target, PathBuf::from("out"));
        assert_eq!(config.split.seed, 7);
        assert!((config.split.train_fraction - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.model_path, Some(PathBuf::from("weights/m.tar.gz")));
        assert_eq!(config.device_type, DeviceType::Cpu);
        // 未指定の項目はデフォルト
        assert!(config.split.sort_listing);
        assert_eq!(config.training.name, "soil_training");
    }

    #[test]
    fn test_load_written_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.split.seed = 99;
        config.training.num_epochs = 3;
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.split.seed, 99);
        assert_eq!(loaded.training.num_epochs, 3);
    }

    #[test]
    fn test_load_or_default_with_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_or_default(Some(&path));
        assert_eq!(config.split.seed, 42);
    }

    #[test]
    fn test_resolve_model_path() {
        let mut config = AppConfig::default();
        let exe_dir = Path::new("/opt/soil/backend");
        assert_eq!(
            config.resolve_model_path(exe_dir),
            PathBuf::from("/opt/soil/backend/../soil_training/weights/model.tar.gz")
        );

        config.model_path = Some(PathBuf::from("/models/best.tar.gz"));
        assert_eq!(config.resolve_model_path(exe_dir), PathBuf::from("/models/best.tar.gz"));
    }

    #[test]
    fn test_device_type_parse_and_display() {
        assert_eq!("cuda".parse::<DeviceType>().unwrap(), DeviceType::Wgpu);
        assert_eq!("CPU".parse::<DeviceType>().unwrap(), DeviceType::Cpu);
        assert!("tpu".parse::<DeviceType>().is_err());
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU");
    }
}
