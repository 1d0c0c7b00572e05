//! データセットを学習用と検証用に分割する
//!
//! `source/<class>/*.{jpg,jpeg,png}` を `target/train/<class>` と
//! `target/val/<class>` にコピーします。元データは変更しません。

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dataset::is_image_file;
use crate::model::SplitSettings;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("source root does not exist: {0}")]
    MissingSourceRoot(PathBuf),

    #[error("train fraction must be within [0, 1], got {0}")]
    InvalidTrainFraction(f64),

    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SplitError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SplitError::MissingSourceRoot(_) => "missing_source_root",
            SplitError::InvalidTrainFraction(_) => "invalid_train_fraction",
            SplitError::Io { .. } => "io_error",
        }
    }

    fn io(context: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| SplitError::Io { context, path, source }
    }
}

/// 1クラス分の割り当て結果（ファイル名のみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSplit {
    pub class_name: String,
    pub train: Vec<String>,
    pub val: Vec<String>,
}

impl ClassSplit {
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len()
    }
}

/// 分割結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// 処理したクラス（処理順）
    pub classes: Vec<ClassSplit>,
    /// 画像が無くスキップしたクラス
    pub skipped: Vec<String>,
}

impl SplitReport {
    pub fn train_count(&self) -> usize {
        self.classes.iter().map(|c| c.train.len()).sum()
    }

    pub fn val_count(&self) -> usize {
        self.classes.iter().map(|c| c.val.len()).sum()
    }
}

/// 学習用に回す枚数 = floor(count × fraction)
pub fn train_len(count: usize, train_fraction: f64) -> usize {
    ((count as f64 * train_fraction).floor() as usize).min(count)
}

/// ディレクトリの中身を列挙する。`sort` が真ならファイル名順
fn list_dir(dir: &Path, sort: bool) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if sort {
        entries.sort_by_key(|e| e.file_name());
    }
    Ok(entries)
}

/// ファイルを書き込まずに割り当てだけを計算する
///
/// 乱数生成器は1回の実行で1つだけ作り、クラスを順に処理しながら消費する。
/// 同じシードなら rand のバージョンをまたいでも同じ割り当てになるよう、
/// 出力列が固定されている `ChaCha12Rng` を直接使う。
pub fn plan_split(settings: &SplitSettings) -> Result<SplitReport, SplitError> {
    if !(0.0..=1.0).contains(&settings.train_fraction) {
        return Err(SplitError::InvalidTrainFraction(settings.train_fraction));
    }

    let source = &settings.source;
    if !source.is_dir() {
        return Err(SplitError::MissingSourceRoot(source.clone()));
    }

    let entries = list_dir(source, settings.sort_listing)
        .map_err(SplitError::io("failed to list source root", source))?;
    tracing::info!(
        "フォルダ: {:?}",
        entries.iter().map(|e| e.file_name()).collect::<Vec<_>>()
    );

    let mut rng = ChaCha12Rng::seed_from_u64(settings.seed);
    let mut report = SplitReport::default();

    for entry in entries {
        let class_dir = entry.path();
        if !class_dir.is_dir() {
            continue;
        }

        let Ok(class_name) = entry.file_name().into_string() else {
            tracing::warn!("UTF-8 でないフォルダ名はスキップします: {}", class_dir.display());
            continue;
        };

        let mut images = Vec::new();
        for img_entry in list_dir(&class_dir, settings.sort_listing)
            .map_err(SplitError::io("failed to list class folder", &class_dir))?
        {
            let path = img_entry.path();
            if !path.is_file() || !is_image_file(&path) {
                continue;
            }
            match img_entry.file_name().into_string() {
                Ok(name) => images.push(name),
                Err(_) => tracing::warn!("UTF-8 でないファイル名はスキップします: {}", path.display()),
            }
        }

        if images.is_empty() {
            tracing::warn!("[empty_class] '{}' に画像がありません。スキップします", class_name);
            report.skipped.push(class_name);
            continue;
        }

        images.shuffle(&mut rng);
        let split = train_len(images.len(), settings.train_fraction);
        let val = images.split_off(split);

        report.classes.push(ClassSplit {
            class_name,
            train: images,
            val,
        });
    }

    Ok(report)
}

/// データセットを分割してコピーする
pub fn split_dataset(settings: &SplitSettings) -> Result<SplitReport, SplitError> {
    tracing::info!(
        "分割元: {} (存在: {})",
        settings.source.display(),
        settings.source.is_dir()
    );

    let report = plan_split(settings)?;

    let target = &settings.target;
    let train_root = target.join("train");
    let val_root = target.join("val");
    fs::create_dir_all(&train_root)
        .map_err(SplitError::io("failed to create directory", &train_root))?;
    fs::create_dir_all(&val_root).map_err(SplitError::io("failed to create directory", &val_root))?;

    for class in &report.classes {
        let class_dir = settings.source.join(&class.class_name);
        let train_class_dir = train_root.join(&class.class_name);
        let val_class_dir = val_root.join(&class.class_name);
        fs::create_dir_all(&train_class_dir)
            .map_err(SplitError::io("failed to create directory", &train_class_dir))?;
        fs::create_dir_all(&val_class_dir)
            .map_err(SplitError::io("failed to create directory", &val_class_dir))?;

        for (files, dest_dir) in [(&class.train, &train_class_dir), (&class.val, &val_class_dir)] {
            for file_name in files {
                let src = class_dir.join(file_name);
                let dst = dest_dir.join(file_name);
                copy_with_metadata(&src, &dst).map_err(SplitError::io("failed to copy", &src))?;
            }
        }

        tracing::info!(
            "✔ {}: {} train | {} val",
            class.class_name,
            class.train.len(),
            class.val.len()
        );
    }

    tracing::info!(
        "分割完了: {} クラス, 学習 {} 枚, 検証 {} 枚, スキップ {} クラス -> {}",
        report.classes.len(),
        report.train_count(),
        report.val_count(),
        report.skipped.len(),
        target.display()
    );

    Ok(report)
}

/// 内容・更新時刻・パーミッションを保ったままコピーする
fn copy_with_metadata(src: &Path, dst: &Path) -> io::Result<()> {
    let metadata = fs::metadata(src)?;
    {
        let mut reader = File::open(src)?;
        let mut writer = File::create(dst)?;
        io::copy(&mut reader, &mut writer)?;
        if let Ok(modified) = metadata.modified() {
            writer.set_modified(modified)?;
        }
    }
    // 読み取り専用の属性は最後に付ける
    fs::set_permissions(dst, metadata.permissions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::{Duration, SystemTime};

    fn write_images(dir: &Path, count: usize) -> Vec<String> {
        fs::create_dir_all(dir).unwrap();
        (0..count)
            .map(|i| {
                let name = format!("img_{:02}.png", i);
                fs::write(dir.join(&name), format!("pixels-{}", i)).unwrap();
                name
            })
            .collect()
    }

    fn settings(source: &Path, target: &Path) -> SplitSettings {
        SplitSettings {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            ..SplitSettings::default()
        }
    }

    fn file_names(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_train_len_is_floor() {
        assert_eq!(train_len(10, 0.8), 8);
        assert_eq!(train_len(7, 0.8), 5);
        assert_eq!(train_len(1, 0.8), 0);
        assert_eq!(train_len(0, 0.8), 0);
        assert_eq!(train_len(3, 1.0), 3);
        assert_eq!(train_len(3, 0.0), 0);
    }

    #[test]
    fn test_sandy_soil_ten_images() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let target = tmp.path().join("out");
        let originals: BTreeSet<String> =
            write_images(&source.join("Sandy_soil"), 10).into_iter().collect();

        let report = split_dataset(&settings(&source, &target)).unwrap();
        assert_eq!(report.classes.len(), 1);
        assert_eq!(report.train_count(), 8);
        assert_eq!(report.val_count(), 2);

        let train = file_names(&target.join("train/Sandy_soil"));
        let val = file_names(&target.join("val/Sandy_soil"));
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert!(train.is_disjoint(&val));
        let union: BTreeSet<String> = train.union(&val).cloned().collect();
        assert_eq!(union, originals);

        // 元データはそのまま
        assert_eq!(file_names(&source.join("Sandy_soil")), originals);
    }

    #[test]
    fn test_seed_42_assignment_is_fixed() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        write_images(&source.join("Sandy_soil"), 10);

        let report = plan_split(&settings(&source, &tmp.path().join("out"))).unwrap();
        let sandy = &report.classes[0];
        assert_eq!(
            sandy.train,
            [
                "img_07.png", "img_03.png", "img_09.png", "img_05.png",
                "img_00.png", "img_08.png", "img_06.png", "img_04.png",
            ]
        );
        assert_eq!(sandy.val, ["img_02.png", "img_01.png"]);
    }

    #[test]
    fn test_counts_for_various_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        for (class, n) in [("a", 1), ("b", 5), ("c", 7), ("d", 13)] {
            write_images(&source.join(class), n);
        }

        let report = plan_split(&settings(&source, &tmp.path().join("out"))).unwrap();
        for class in &report.classes {
            let n = class.total();
            assert_eq!(class.train.len(), (n as f64 * 0.8).floor() as usize, "{}", class.class_name);
            assert_eq!(class.val.len(), n - (n as f64 * 0.8).floor() as usize);
        }
        // 1枚だけのクラスは floor(0.8) = 0 なので学習用が空になる
        let a = report.classes.iter().find(|c| c.class_name == "a").unwrap();
        assert!(a.train.is_empty());
        assert_eq!(a.val.len(), 1);
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        write_images(&source.join("Clay soil"), 20);
        write_images(&source.join("Red soil"), 9);

        let first = split_dataset(&settings(&source, &tmp.path().join("out1"))).unwrap();
        let second = split_dataset(&settings(&source, &tmp.path().join("out2"))).unwrap();
        assert_eq!(first, second);

        // 同じ出力先への再実行も同じ集合になる
        let again = split_dataset(&settings(&source, &tmp.path().join("out1"))).unwrap();
        assert_eq!(first, again);
        assert_eq!(
            file_names(&tmp.path().join("out1/train/Clay soil")).len(),
            first.classes[0].train.len()
        );
    }

    #[test]
    fn test_different_seed_changes_assignment() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        write_images(&source.join("Black Soil"), 30);

        let a = plan_split(&settings(&source, tmp.path())).unwrap();
        let b = plan_split(&SplitSettings {
            seed: 7,
            ..settings(&source, tmp.path())
        })
        .unwrap();

        let a_train: BTreeSet<_> = a.classes[0].train.iter().collect();
        let b_train: BTreeSet<_> = b.classes[0].train.iter().collect();
        assert_eq!(a_train.len(), b_train.len());
        assert_ne!(a_train, b_train);
    }

    #[test]
    fn test_empty_class_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let target = tmp.path().join("out");
        write_images(&source.join("Alluvial soil"), 4);
        fs::create_dir_all(source.join("Empty")).unwrap();
        fs::write(source.join("Empty/readme.txt"), "no images here").unwrap();

        let report = split_dataset(&settings(&source, &target)).unwrap();
        assert_eq!(report.skipped, vec!["Empty".to_string()]);
        assert_eq!(report.classes.len(), 1);
        assert!(!target.join("train/Empty").exists());
        assert!(!target.join("val/Empty").exists());
        assert!(target.join("train/Alluvial soil").is_dir());
    }

    #[test]
    fn test_non_images_and_loose_files_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let class_dir = source.join("Mixed");
        fs::create_dir_all(&class_dir).unwrap();
        for name in ["a.JPG", "b.jpeg", "c.Png", "d.gif", "e.txt"] {
            fs::write(class_dir.join(name), name).unwrap();
        }
        fs::create_dir_all(class_dir.join("nested.png")).unwrap();
        fs::write(source.join("labels.csv"), "x").unwrap();

        let report = plan_split(&settings(&source, &tmp.path().join("out"))).unwrap();
        assert_eq!(report.classes.len(), 1);
        let mixed = &report.classes[0];
        let all: BTreeSet<_> = mixed.train.iter().chain(&mixed.val).cloned().collect();
        let expected: BTreeSet<String> =
            ["a.JPG", "b.jpeg", "c.Png"].iter().map(|s| s.to_string()).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_missing_source_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("out");
        let err = split_dataset(&settings(&tmp.path().join("missing"), &target)).unwrap_err();

        assert!(matches!(err, SplitError::MissingSourceRoot(_)));
        assert_eq!(err.error_code(), "missing_source_root");
        assert!(!target.exists());
    }

    #[test]
    fn test_invalid_train_fraction() {
        let tmp = tempfile::tempdir().unwrap();
        let err = plan_split(&SplitSettings {
            train_fraction: 1.5,
            ..settings(tmp.path(), tmp.path())
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid_train_fraction");
    }

    #[test]
    fn test_copy_preserves_modified_time() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let target = tmp.path().join("out");
        write_images(&source.join("Sandy_soil"), 1);

        let src_file = source.join("Sandy_soil/img_00.png");
        let past = SystemTime::now() - Duration::from_secs(3600 * 24);
        File::options()
            .write(true)
            .open(&src_file)
            .unwrap()
            .set_modified(past)
            .unwrap();

        split_dataset(&settings(&source, &target)).unwrap();

        let copied = target.join("val/Sandy_soil/img_00.png");
        assert_eq!(fs::read(&copied).unwrap(), fs::read(&src_file).unwrap());
        assert_eq!(
            fs::metadata(&copied).unwrap().modified().unwrap(),
            fs::metadata(&src_file).unwrap().modified().unwrap()
        );
    }
}
