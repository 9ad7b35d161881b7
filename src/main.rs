use std::io::Write;
use std::path::{Path, PathBuf};

use aec_sync_lib::audio::synthetic::synthetic_pair;
use aec_sync_lib::audio::wav::{read_pcm16_pair, write_pcm16};
use aec_sync_lib::audio::NativeAec3Library;
use aec_sync_lib::log::{init_logging, set_pipeline_debug};
use aec_sync_lib::{
    AecConfig, AecError, AudioBuffer, Pipeline, PipelineOutput, PipelineStage, ProcessedAudio,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

const PROGRESS_BAR_WIDTH: usize = 50;

#[derive(Parser, Debug)]
#[command(author, version, about = "Frame-synchronized echo cancellation over WAV files", long_about = None)]
struct Args {
    /// Far-end reference WAV (what the loudspeaker played)
    #[arg(default_value = "ref.wav")]
    reference: PathBuf,

    /// Near-end capture WAV (what the microphone recorded)
    #[arg(default_value = "rec.wav")]
    capture: PathBuf,

    /// Echo-cancelled output WAV
    #[arg(default_value = "out.wav")]
    output: PathBuf,

    /// Use generated test data instead of the input files
    #[arg(long)]
    test: bool,

    /// Buffer delay hint in samples (fallback when --auto-delay finds nothing)
    #[arg(long, allow_negative_numbers = true)]
    delay: Option<i32>,

    /// Estimate the buffer delay from the signals
    #[arg(long)]
    auto_delay: bool,

    /// Where to write the 16kHz linear output
    #[arg(long, default_value = "linear.wav")]
    linear_output: PathBuf,

    /// Skip the linear output
    #[arg(long)]
    no_linear: bool,

    /// Path to the native AEC3 library
    #[arg(long)]
    library: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);
    set_pipeline_debug(args.verbose);

    let mut config = match &args.config {
        Some(path) => AecConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AecConfig::default(),
    };
    if let Some(delay) = args.delay {
        config.delay_samples = delay;
    }
    config.auto_delay |= args.auto_delay;
    if args.no_linear {
        config.export_linear = false;
    }
    if args.library.is_some() {
        config.library_path = args.library.clone();
    }

    info!("======================================");
    info!("ref file is: {}", args.reference.display());
    info!("rec file is: {}", args.capture.display());
    info!("out file is: {}", args.output.display());
    if config.auto_delay {
        info!("Audio buffer delay: AUTO samples");
    } else {
        info!("Audio buffer delay: {} samples", config.delay_samples);
    }
    if args.test {
        info!("Using generated test data");
    }
    info!("======================================");

    config.validate().context("invalid configuration")?;
    let (reference, capture) = load_inputs(&args, &config)?;
    log_format("ref", &reference);
    log_format("rec", &capture);

    let config = config.with_format(reference.sample_rate(), reference.channels());
    config.validate().context("invalid configuration")?;

    let library = NativeAec3Library::load(config.library_path.as_deref())
        .context("failed to load the AEC3 library")?;
    info!("Using AEC3 library at {}", library.location().display());

    let pipeline = Pipeline::new(config.pipeline_config())?;
    info!("Processing audio frames ...");
    let mut progress = ProgressPrinter::default();
    let result = pipeline.run_with_progress(&reference, &capture, &library, |stage, done, total| {
        progress.update(stage, done, total)
    });
    println!();

    let paths = OutputPaths {
        output: &args.output,
        linear_output: &args.linear_output,
    };
    finish_run(result, &paths)?;
    Ok(())
}

/// Destinations for the cancelled and linear outputs
struct OutputPaths<'a> {
    output: &'a Path,
    linear_output: &'a Path,
}

fn write_outputs(paths: &OutputPaths<'_>, audio: &ProcessedAudio) -> Result<()> {
    write_pcm16(paths.output, &audio.output)
        .with_context(|| format!("failed to write {}", paths.output.display()))?;
    match &audio.linear_output {
        Some(linear) => {
            write_pcm16(paths.linear_output, linear)
                .with_context(|| format!("failed to write {}", paths.linear_output.display()))?;
            info!(
                "Output written to {} and {}",
                paths.output.display(),
                paths.linear_output.display()
            );
        }
        None => info!("Output written to {}", paths.output.display()),
    }
    Ok(())
}

/// Write whatever the run produced; a frame failure still saves the frames before it
fn finish_run(
    result: aec_sync_lib::Result<PipelineOutput>,
    paths: &OutputPaths<'_>,
) -> Result<PipelineOutput> {
    match result {
        Ok(output) => {
            info!(
                "Processing complete! {} frames with delay {} samples",
                output.audio.frames_processed, output.delay_samples
            );
            write_outputs(paths, &output.audio)?;
            Ok(output)
        }
        Err(AecError::ProcessingFailure {
            frame_index,
            frame_count,
            reason,
            partial,
        }) => {
            error!("Error processing frame {}/{}: {}", frame_index, frame_count, reason);
            write_outputs(paths, &partial)?;
            warn!(
                "Output is partial: {} of {} frames processed, the rest is silence",
                partial.frames_processed, frame_count
            );
            anyhow::bail!("processing aborted at frame {}", frame_index)
        }
        Err(e) => Err(e).context("echo cancellation failed"),
    }
}

/// Load the signal pair, degrading to generated data when the files are unusable
///
/// Generated data takes its format from the configuration.
fn load_inputs(args: &Args, config: &AecConfig) -> Result<(AudioBuffer, AudioBuffer)> {
    if !args.test {
        match read_pcm16_pair(&args.reference, &args.capture) {
            Ok(pair) => return Ok(pair),
            Err(AecError::SourceFormatMismatch { reference, capture }) => {
                warn!(
                    "ref file format {} != rec file format {}, switching to generated test data",
                    reference, capture
                );
            }
            Err(e) => {
                warn!("Error loading WAV files: {}", e);
                warn!("Switching to generated test data.");
            }
        }
    }

    let pair = synthetic_pair(config.sample_rate, config.channels)
        .context("failed to generate test data")?;
    info!(
        "Generated test data: {:.1}s at {}",
        pair.0.duration_secs(),
        pair.0.format()
    );
    Ok(pair)
}

fn log_format(name: &str, buffer: &AudioBuffer) {
    let format = buffer.format();
    info!("======================================");
    info!("{} information:", name);
    info!("channels: {}", format.channels);
    info!("sample_rate: {}", format.sample_rate);
    info!("bits_per_sample: {}", format.bits_per_sample);
    info!("total_samples: {}", buffer.len());
    info!("======================================");
}

fn render_progress(current: usize, total: usize) -> String {
    let percentage = if total == 0 { 100 } else { current * 100 / total };
    let filled = (percentage * PROGRESS_BAR_WIDTH / 100).min(PROGRESS_BAR_WIDTH);
    format!(
        "        {}/{}    {}%|{}>{}|\r",
        current,
        total,
        percentage,
        "=".repeat(filled),
        " ".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

/// Redraws one progress bar per pipeline stage
#[derive(Default)]
struct ProgressPrinter {
    stage: Option<PipelineStage>,
}

impl ProgressPrinter {
    fn update(&mut self, stage: PipelineStage, current: usize, total: usize) {
        let mut stdout = std::io::stdout().lock();
        if self.stage.is_some_and(|previous| previous != stage) {
            let _ = stdout.write_all(b"\n");
        }
        self.stage = Some(stage);
        let _ = stdout.write_all(render_progress(current, total).as_bytes());
        let _ = stdout.flush();
    }
}
