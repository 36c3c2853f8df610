mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam::channel::{after, bounded, never, select, unbounded};
use waveweaver_core::config::Settings;
use waveweaver_core::separation::{
    catalog, naming, JobMonitor, OrtProvider, ProcessingJob, SeparationPipeline,
};
use waveweaver_core::SUPPORTED_AUDIO_EXTENSIONS;

use crate::progress::{CliProgress, Ending};

#[derive(Parser)]
#[command(name = "waveweaver", version, about = "Separate an audio file into stems")]
struct Cli {
    /// Input audio file (mp3, wav, flac, m4a or ogg)
    #[arg(required_unless_present = "list_models")]
    input: Option<PathBuf>,

    /// Output directory; stems go to <OUTPUT>/<input name>/
    /// Default: the input file's directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model key (see --list-models). Default: model.default_model from config
    #[arg(short, long)]
    model: Option<String>,

    /// Stems to extract, comma-separated (e.g. "vocals,drums").
    /// Default: all stems of the chosen model.
    #[arg(short, long, value_delimiter = ',')]
    stems: Option<Vec<String>>,

    /// Config file (default: <config dir>/waveweaver/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only show real progress while the model runs
    #[arg(long)]
    no_animation: bool,

    /// Print the available models and exit
    #[arg(long)]
    list_models: bool,
}

fn list_models() {
    for model in catalog::all() {
        println!("{:<12} {}", model.key, model.display_name());
        println!("{:<12} stems: {}", "", model.stems.join(", "));
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_models {
        list_models();
        return Ok(ExitCode::SUCCESS);
    }

    let settings = Settings::load(cli.config.as_deref());

    let input = cli.input.context("No input file given")?;
    if !naming::validate_audio_file(&input) {
        bail!(
            "Not a supported audio file: {} (supported: {})",
            input.display(),
            SUPPORTED_AUDIO_EXTENSIONS.join(", ")
        );
    }

    let model_key = cli.model.unwrap_or_else(|| settings.model.default_model.clone());
    let descriptor = catalog::resolve(&model_key)?;
    let stems = cli
        .stems
        .unwrap_or_else(|| descriptor.stems.iter().map(|s| s.to_string()).collect());
    let output_dir = match cli.output {
        Some(dir) => dir,
        None => input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let job = ProcessingJob::new(&input, &output_dir, descriptor.key, stems);
    job.validate()
        .with_context(|| format!("Cannot start extraction of {}", input.display()))?;

    log::info!(
        "waveweaver starting: {} -> {} ({}: {})",
        input.display(),
        naming::output_folder(&output_dir, &input).display(),
        descriptor.name,
        job.stems().join(", ")
    );

    let manager = settings
        .model_manager()
        .context("Failed to initialize model cache")?;
    let provider = Arc::new(OrtProvider::new(manager, settings.model.shifts));
    let mut pipeline =
        SeparationPipeline::new(provider).with_output_options(settings.output_options());

    // First Ctrl-C cancels at the next checkpoint, a second one quits
    let (interrupt_tx, interrupt_rx) = bounded(4);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    let (tx, rx) = unbounded();
    pipeline.start(job, tx)?;

    let animate = settings.ui.artificial_progress && !cli.no_animation;
    let mut monitor =
        JobMonitor::new(animate).with_max_filename_display(settings.ui.max_filename_display);
    let mut bar = CliProgress::new()?;
    let mut rng = rand::thread_rng();
    let mut interrupted = false;

    for notification in monitor.begin() {
        bar.render(notification);
    }

    loop {
        let timer = match monitor.next_tick() {
            Some(delay) => after(delay),
            None => never(),
        };

        select! {
            recv(rx) -> message => match message {
                Ok(event) => {
                    let last = event.is_final();
                    for notification in monitor.handle(event) {
                        bar.render(notification);
                    }
                    if last {
                        break;
                    }
                }
                // Worker exited without a final event
                Err(_) => break,
            },
            recv(interrupt_rx) -> _ => {
                if interrupted {
                    log::warn!("Interrupted again, exiting without waiting for the worker");
                    std::process::exit(130);
                }
                interrupted = true;
                pipeline.cancel();
                bar.notice("Cancelling... press Ctrl-C again to quit immediately");
            },
            recv(timer) -> _ => {
                for notification in monitor.tick(&mut rng) {
                    bar.render(notification);
                }
            }
        }
    }

    if pipeline.join().is_none() {
        log::error!("Separation worker ended unexpectedly");
    }

    Ok(match bar.ending() {
        Ending::Completed => ExitCode::SUCCESS,
        Ending::Failed | Ending::Cancelled | Ending::Running => ExitCode::FAILURE,
    })
}
