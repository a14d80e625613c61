mod settings;

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use agedetect_core::capture::domain::photo_reader::PhotoReader;
use agedetect_core::capture::infrastructure::image_file_reader::ImageFileReader;
use agedetect_core::classification::infrastructure::onnx_age_classifier::OnnxAgeModelLoader;
use agedetect_core::detection::infrastructure::onnx_blazeface_locator::OnnxBlazefaceLocator;
use agedetect_core::pipeline::age_detection_session::AgeDetectionSession;
use agedetect_core::pipeline::detect_ages_use_case::DetectAgesUseCase;
use agedetect_core::pipeline::infrastructure::threaded_classification_executor::ThreadedClassificationExecutor;
use agedetect_core::pipeline::pipeline_event::{PipelineEvent, RunOutcome};
use agedetect_core::pipeline::pipeline_logger::LogPipelineLogger;
use agedetect_core::shared::constants::{AGE_MODEL_NAME, FACE_MODEL_NAME, IMAGE_EXTENSIONS};
use agedetect_core::shared::model_resolver::{self, ModelSource, ProgressFn};
use agedetect_core::shared::orientation::Orientation;

use settings::Settings;

/// Count the children and adults in a photo.
#[derive(Parser)]
#[command(name = "agedetect")]
struct Cli {
    /// Photo to analyse.
    photo: PathBuf,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Margin added around each face before classifying (0.0-1.0).
    #[arg(long)]
    margin: Option<f64>,

    /// Number of classification worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Directory holding bundled model files.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Explicit face detection model file.
    #[arg(long)]
    detector_model: Option<PathBuf>,

    /// Explicit age classification model file.
    #[arg(long)]
    age_model: Option<PathBuf>,

    /// Download URL for the face detection model.
    #[arg(long)]
    detector_url: Option<String>,

    /// Download URL for the age classification model.
    #[arg(long)]
    age_url: Option<String>,

    /// Override the EXIF orientation (up, down, left, right, up-mirrored, ...).
    #[arg(long)]
    orientation: Option<Orientation>,

    /// Persist the effective confidence, margin, workers, models dir and URLs.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = merge(&cli, Settings::load());
    validate(&cli, &settings)?;

    if cli.save_settings {
        let path = settings.save()?;
        log::info!("Saved settings to {}", path.display());
    }

    let mut reader = ImageFileReader::new();
    if let Some(orientation) = cli.orientation {
        reader = reader.with_orientation(orientation);
    }
    let photo = reader
        .read(&cli.photo)
        .map_err(|e| e.to_string())?;

    let use_case = build_use_case(&cli, &settings)?;
    let mut session = AgeDetectionSession::new(use_case);
    session.choose(photo);

    while session.is_running() {
        for event in session.poll() {
            match render(&event) {
                Some(Output::Stdout(line)) => println!("{line}"),
                Some(Output::Stderr(line)) => eprintln!("{line}"),
                None => {}
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    if session.last_outcome() == Some(RunOutcome::LocatorFailed) {
        return Err("face detection failed".into());
    }
    Ok(())
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Output {
    Stdout(String),
    Stderr(String),
}

/// Text shown for one pipeline update, if any.
fn render(event: &PipelineEvent) -> Option<Output> {
    match event {
        PipelineEvent::FacesLocated(summary)
        | PipelineEvent::NoFaces(summary)
        | PipelineEvent::Finished(summary) => Some(Output::Stdout(summary.message.clone())),
        PipelineEvent::FaceClassified {
            index,
            bucket: Some(bucket),
            ..
        } => Some(Output::Stdout(format!("Face {}: {bucket}", index + 1))),
        PipelineEvent::FaceClassified { bucket: None, .. } => None,
        PipelineEvent::Alert(alert) => {
            Some(Output::Stderr(format!("{}: {}", alert.title, alert.message)))
        }
        PipelineEvent::Cancelled => Some(Output::Stderr("Cancelled".to_string())),
    }
}

/// Flags win over persisted settings.
fn merge(cli: &Cli, mut settings: Settings) -> Settings {
    if let Some(c) = cli.confidence {
        settings.confidence = c;
    }
    if let Some(m) = cli.margin {
        settings.margin = m;
    }
    if cli.workers.is_some() {
        settings.workers = cli.workers;
    }
    if cli.models_dir.is_some() {
        settings.models_dir = cli.models_dir.clone();
    }
    if cli.detector_url.is_some() {
        settings.detector_url = cli.detector_url.clone();
    }
    if cli.age_url.is_some() {
        settings.age_url = cli.age_url.clone();
    }
    settings
}

fn build_use_case(
    cli: &Cli,
    settings: &Settings,
) -> Result<DetectAgesUseCase, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {FACE_MODEL_NAME}");
    let detector_source = ModelSource {
        path: cli.detector_model.clone(),
        bundled_dir: settings.models_dir.clone(),
        url: settings.detector_url.clone(),
        ..ModelSource::named(FACE_MODEL_NAME)
    };
    let downloaded = Arc::new(AtomicBool::new(false));
    let progress_flag = downloaded.clone();
    let progress: ProgressFn = Box::new(move |done, total| {
        progress_flag.store(true, Ordering::Relaxed);
        download_progress(done, total);
    });
    let detector_path = model_resolver::resolve(&detector_source, Some(progress))?;
    if downloaded.load(Ordering::Relaxed) {
        // Terminate the `\r` progress line.
        eprintln!();
    }
    let locator = OnnxBlazefaceLocator::new(&detector_path, settings.confidence)
        .map_err(|e| e.to_string())?
        .with_margin(settings.margin);

    // The age model is resolved lazily, on the first face.
    let age_source = ModelSource {
        path: cli.age_model.clone(),
        bundled_dir: settings.models_dir.clone(),
        url: settings.age_url.clone(),
        ..ModelSource::named(AGE_MODEL_NAME)
    };
    let loader = Arc::new(OnnxAgeModelLoader::new(age_source));

    let executor = match settings.workers {
        Some(n) => ThreadedClassificationExecutor::with_workers(n),
        None => ThreadedClassificationExecutor::new(),
    };

    Ok(DetectAgesUseCase::new(
        Box::new(locator),
        loader,
        Box::new(executor),
        Box::new(LogPipelineLogger::new()),
    ))
}

fn validate(cli: &Cli, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.photo.exists() {
        return Err(format!("Photo not found: {}", cli.photo.display()).into());
    }
    if !is_image(&cli.photo) {
        return Err(format!(
            "Unsupported image type: {} (expected one of {})",
            cli.photo.display(),
            IMAGE_EXTENSIONS.join(", ")
        )
        .into());
    }
    if !(0.0..=1.0).contains(&settings.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence
        )
        .into());
    }
    if !(0.0..=1.0).contains(&settings.margin) {
        return Err(format!("Margin must be between 0.0 and 1.0, got {}", settings.margin).into());
    }
    if settings.workers == Some(0) {
        return Err("Workers must be at least 1".into());
    }
    for model in [&cli.detector_model, &cli.age_model].into_iter().flatten() {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if let Some(dir) = &settings.models_dir {
        if !dir.is_dir() {
            return Err(format!("Models directory not found: {}", dir.display()).into());
        }
    }
    Ok(())
}

fn is_image(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
