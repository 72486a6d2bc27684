//! Screenshot Catalog
//!
//! Command-line entry point: batch processing of a screenshot folder,
//! single-image inspection, and a folder watcher.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;

use screenshot_catalog::config::{ScreenshotConfig, WatchConfig};
use screenshot_catalog::ocr::{ensure_tessdata, TesseractOcr};
use screenshot_catalog::pipeline::{analyze_path, build_analyzer, run_batch, BatchPaths, ScreenshotAnalyzer};
use screenshot_catalog::watch::{request_stop, reset_stop_flag, Watcher, STOP_REQUESTED};
use screenshot_catalog::{log, paths};

#[derive(Parser)]
#[command(name = "screenshot-catalog")]
#[command(about = "Turns marketplace listing screenshots into catalog records", long_about = None)]
struct Cli {
    /// Project root holding screenshots_input/, images/, data/ and the config files
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group every screenshot in screenshots_input/ and write suggested_products.json
    Process {
        /// Screenshots analyzed in parallel (defaults to the CPU count)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print what is extracted from one screenshot, as JSON
    Inspect {
        image: PathBuf,
    },

    /// Watch the configured folder and append new screenshots to data/data.json (q to stop)
    Watch,

    /// Download missing Tesseract traineddata for the configured languages
    Setup,
}

fn load_analyzer(config: &ScreenshotConfig) -> Result<Box<dyn ScreenshotAnalyzer>> {
    let ocr = TesseractOcr::discover(&config.tesseract)?;
    Ok(build_analyzer(config, Box::new(ocr)))
}

/// Stops the watcher once `q` is entered on the console.
fn spawn_stop_listener() {
    std::thread::spawn(|| {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if matches!(line.trim(), "q" | "quit") {
                request_stop();
                break;
            }
        }
    });
}

fn main() -> Result<()> {
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
        log(&format!("[PANIC]{} {}", location, msg));
    }));

    let cli = Cli::parse();

    if let Some(root) = &cli.root {
        paths::init_project_root(root);
    }
    paths::ensure_directories()?;

    let config = ScreenshotConfig::load(&paths::get_screenshot_config());

    match cli.command {
        Commands::Process { workers } => {
            let analyzer = load_analyzer(&config)?;
            let workers = workers.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });
            let batch_paths = BatchPaths::from_project_root();
            let summary = run_batch(&batch_paths, analyzer.as_ref(), config.min_overlap, workers)?;

            println!();
            println!(
                "Done: {} screenshots grouped into {} products ({} records).",
                summary.screenshots,
                summary.groups,
                summary.records.len()
            );
            println!("  - Records: {}", batch_paths.suggested_json.display());
            println!("  - Images:  {}", batch_paths.images_dir.display());
            println!("Review the suggested records, then merge them into {}.", batch_paths.data_json.display());
            Ok(())
        }

        Commands::Inspect { image } => {
            let analyzer = load_analyzer(&config)?;
            let result = analyze_path(&image, analyzer.as_ref())
                .ok_or_else(|| anyhow!("Could not read {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Watch => {
            let analyzer = load_analyzer(&config)?;
            let watch_config = WatchConfig::load(&paths::get_watch_config());
            let mut watcher = Watcher::from_config(&watch_config, analyzer.as_ref())?;
            reset_stop_flag();
            spawn_stop_listener();
            println!("Enter q to stop watching.");
            watcher.run(&STOP_REQUESTED);
            Ok(())
        }

        Commands::Setup => {
            let tessdata = ensure_tessdata(&config.tesseract.lang)?;
            log(&format!("Traineddata ready in {}", tessdata.display()));
            let ocr = TesseractOcr::discover(&config.tesseract)?;
            log(&format!("Using {:?}", ocr));
            Ok(())
        }
    }
}
