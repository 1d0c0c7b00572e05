//! モデルアーティファクトのメタデータを表示し、画像が指定されれば予測結果を人が読める形で表示する

use anyhow::Result;
use clap::Parser;
use soil_classifier_lib::model::{load_metadata, print_metadata_info, DeviceType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "inspect-model")]
#[command(about = "Show model metadata and optionally a human-readable prediction")]
struct Args {
    /// モデルアーティファクト (.tar.gz)
    model: PathBuf,

    /// 試しに分類する画像
    image: Option<PathBuf>,

    /// 推論デバイス (wgpu | cpu)
    #[arg(long, default_value = "cpu")]
    device: DeviceType,

    /// ログレベル
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    soil_classifier_lib::init_logging(&args.log_level);

    let metadata = load_metadata(&args.model)?;
    print_metadata_info(&metadata);

    if let Some(image) = args.image {
        show_prediction(&args.model, &image, args.device)?;
    }
    Ok(())
}

#[cfg(feature = "ml")]
fn show_prediction(model: &std::path::Path, image: &std::path::Path, device: DeviceType) -> Result<()> {
    use soil_classifier_lib::ml::load_classifier;
    use soil_classifier_lib::predict::predict_image;

    let classifier = load_classifier(model, device)?;
    let prediction = predict_image(classifier.as_ref(), image)?;

    println!("\n=== SOIL PREDICTION ===");
    println!("Index:      {}", prediction.index);
    println!("Soil type:  {}", prediction.soil_type);
    println!("Confidence: {:.2}%", prediction.confidence * 100.0);
    Ok(())
}

#[cfg(not(feature = "ml"))]
fn show_prediction(_model: &std::path::Path, _image: &std::path::Path, _device: DeviceType) -> Result<()> {
    anyhow::bail!("prediction requires the ml feature")
}
