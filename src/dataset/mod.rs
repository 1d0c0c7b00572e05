//! クラスフォルダ形式の画像データセットの操作

pub mod splitter;

pub use splitter::{plan_split, split_dataset, ClassSplit, SplitError, SplitReport};

use std::path::Path;

/// 画像として扱う拡張子（小文字）
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 拡張子が画像かどうか（大文字小文字は区別しない）
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
