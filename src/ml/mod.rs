pub mod ml_model;
pub mod training;
pub mod inference;

pub use ml_model::{SoilClassifier, ModelConfig, MIN_IMAGE_SIZE, encode_weights, decode_weights, load_and_normalize_image};
pub use training::{ImageFolderDataset, ImageBatcher, TrainingSummary, prepare_datasets, train_model};
pub use inference::{InferenceEngine, load_classifier};
