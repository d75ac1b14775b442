//! deckscan
//!
//! Reads decklist screenshots from a card game client, recognizes the
//! localized card names and quantities, and resolves them against a card
//! catalog. Results stream to stdout as one event per frame.

mod batch;
mod catalog;
mod cli;
mod config;
mod error;
mod extract;
mod layout;
mod logging;
mod matcher;
mod ocr;
mod paths;
mod persistence;
mod pipeline;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use batch::{BatchItem, CancelFlag, StreamEvent};
use catalog::Catalog;
use cli::{Cli, Commands, OutputFormat};
use config::AppConfig;
use layout::SectionKind;
use matcher::Resolver;
use ocr::{Recognizers, TesseractRecognizer};
use persistence::DeckApiClient;
use pipeline::Pipeline;

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories().context("Failed to create output directories")?;
    logging::init_logging(cli.verbose)?;
    install_panic_hook();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = catalog.clone();
    }
    config::init_config(config);
    let config = config::get_config();

    match cli.command {
        Commands::Process {
            images,
            sequential,
            concurrency,
            save,
            format,
        } => {
            let mode = cli::batch_mode(sequential, concurrency, &config.batch);
            run_process(config, &images, mode, save, format)
        }
        Commands::Segment { image, overlay } => run_segment(&config, &image, overlay.as_deref()),
        Commands::Match { name, section } => run_match(config, &name, section),
        Commands::Setup => run_setup(&config),
    }
}

/// Routes panics through the log so worker panics land in the log file too.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        error!("[PANIC]{} {}", location, msg);
    }));
}

fn load_catalog(config: &AppConfig) -> Result<Arc<Catalog>> {
    let path = config.resolved_catalog_path();
    let catalog = Catalog::load(&path)
        .with_context(|| format!("Failed to load catalog: {}", path.display()))?;
    Ok(Arc::new(catalog))
}

fn run_process(
    config: Arc<AppConfig>,
    images: &[PathBuf],
    mode: batch::BatchMode,
    save: bool,
    format: OutputFormat,
) -> Result<()> {
    let catalog = load_catalog(&config)?;

    let primary = TesseractRecognizer::from_profile(&config.recognition.primary)?;
    let secondary = TesseractRecognizer::from_profile(&config.recognition.secondary)?.digits_only();
    let mut pipeline = Pipeline::new(config.clone(), catalog, Recognizers::new(primary, secondary))?;

    if save {
        match DeckApiClient::from_config(&config.persistence)? {
            Some(client) => pipeline = pipeline.with_publisher(Arc::new(client)),
            None => return Err(anyhow!("--save needs persistence.base_url in the config")),
        }
    }

    let items: Vec<BatchItem> = images
        .iter()
        .enumerate()
        .map(|(index, path)| BatchItem::new(index, display_name(path), read_image(path)))
        .collect();

    info!("Processing {} image(s) in {:?} mode", items.len(), mode);
    let cancel = CancelFlag::new();
    let (events, handle) = batch::spawn_batch(Arc::new(pipeline), items, mode, cancel.clone())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for event in events.iter() {
        if let Err(e) = write_event(&mut out, &event, format) {
            warn!("Output closed ({}). Cancelling batch.", e);
            cancel.cancel();
            break;
        }
        if event.is_terminal() {
            break;
        }
    }
    drop(events);

    let summary = handle
        .join()
        .map_err(|_| anyhow!("Batch thread panicked"))?;
    info!(
        "Batch finished: {}/{} succeeded in {:.2}s{}",
        summary.successful,
        summary.total,
        summary.elapsed_seconds,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

/// Unreadable files become empty payloads and are rejected by validation
/// with the other inputs.
fn read_image(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| {
        warn!("Failed to read {}: {}", path.display(), e);
        Vec::new()
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_event(out: &mut impl Write, event: &StreamEvent, format: OutputFormat) -> Result<()> {
    let frame = match format {
        OutputFormat::Sse => event.to_sse()?,
        OutputFormat::JsonLines => event.to_json_line()?,
    };
    out.write_all(frame.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn run_segment(config: &AppConfig, screenshot: &Path, overlay: Option<&Path>) -> Result<()> {
    let img = image::open(screenshot)
        .with_context(|| format!("Failed to open image: {}", screenshot.display()))?
        .to_rgba8();

    let segmentation = layout::segment(&img, &config.segmentation)?;
    let slots: Vec<_> = segmentation
        .sections
        .iter()
        .flat_map(|section| layout::find_card_slots(&img, section, &config.segmentation))
        .collect();
    info!(
        "{} section(s), {} slot(s), metadata boundary at y={}",
        segmentation.sections.len(),
        slots.len(),
        segmentation.metadata.bbox.bottom()
    );

    let report = serde_json::json!({
        "metadataBoundary": segmentation.metadata.bbox.bottom(),
        "metadata": segmentation.metadata,
        "sections": segmentation.sections,
        "slots": slots,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(path) = overlay {
        let rendered = layout::preview::render_segmentation(
            &img,
            &segmentation,
            &slots,
            &config.extraction.metadata_fields,
            config.extraction.name_split_ratio,
        );
        rendered
            .save(path)
            .with_context(|| format!("Failed to write overlay: {}", path.display()))?;
        info!("Overlay saved to {}", path.display());
    }
    Ok(())
}

fn run_match(config: Arc<AppConfig>, name: &str, section: Option<SectionKind>) -> Result<()> {
    let catalog = load_catalog(&config)?;
    let resolver = Resolver::new(catalog, config);
    let result = resolver.resolve(name, section);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_setup(config: &AppConfig) -> Result<()> {
    for (label, profile) in [
        ("primary", &config.recognition.primary),
        ("secondary", &config.recognition.secondary),
    ] {
        let tessdata = ocr::setup::ensure_traineddata(&profile.language)?;
        let executable = ocr::setup::locate_tesseract(profile)?;
        info!(
            "{} recognizer ready: {} ({}, tessdata {})",
            label,
            executable.display(),
            profile.language,
            tessdata.display()
        );
    }
    Ok(())
}
