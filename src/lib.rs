//! 土壌画像分類ツール
//!
//! - `dataset`: クラスフォルダ形式のデータセットを学習用と検証用に分割
//! - `ml`: Burn による分類モデルの学習と推論（`ml` feature）
//! - `predict`: 単一画像推論の JSON 出力契約
//! - `model`: 設定ファイルとモデルアーティファクト

#![recursion_limit = "256"]
pub mod dataset;
pub mod model;
pub mod predict;
#[cfg(feature = "ml")]
pub mod ml;

use tracing_subscriber::EnvFilter;

/// ログを標準エラー出力に初期化する
///
/// `RUST_LOG` が設定されていればそちらを優先する。標準出力は結果の書き出し専用。
pub fn init_logging(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
