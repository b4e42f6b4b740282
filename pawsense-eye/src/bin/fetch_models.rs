//! Download the stock dog detector into the configured model path

use pawsense_core::PawsenseConfig;
use pawsense_eye::models::store::{ensure_model, DETECTOR_URL};
use pawsense_eye::VisionError;
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), VisionError> {
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = PawsenseConfig::load(config_path.as_deref())
        .map_err(|e| VisionError::Model(format!("Failed to load configuration: {}", e)))?;

    println!("Fetching dog detector...");
    let path = ensure_model(&config.models.detector_path, DETECTOR_URL, "").await?;
    println!("Detector available at: {:?}", path);

    if config.models.classifier_path.exists() {
        println!("Emotion classifier found at: {:?}", config.models.classifier_path);
    } else {
        eprintln!(
            "Emotion classifier not found at {:?}; export the trained model to ONNX and place it there",
            config.models.classifier_path
        );
    }
    Ok(())
}
