use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use gopcache::{
    BatchPlan, CacheSnapshot, Clip, CodecBackend, CodecFamily, CodecOptions, CodecVariant,
    FfmpegLogLevel, Frame, FrameMetrics, GroupOfPictures, PredictionDirection, ProgressCallback,
    ProgressInfo, RawCodec, StandardCodec, StandardCodecOptions, StandardEncoder, TrainingPhase,
    VideoCompressor,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  gopcache plan 8 --clip-len 100\n  gopcache plan 9 --clip-len 100 --parallel --batch-size 4 --json\n  gopcache simulate --clip-len 40 --requests 3,8,21 --progress\n  gopcache encode frames/ --encoder x265 --crf 23\n  gopcache schedule --epoch 5\n  gopcache completions zsh > _gopcache";

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

#[derive(Debug, Parser)]
#[command(
    name = "gopcache",
    version,
    about = "Plan and simulate GOP-scheduled video compression",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// FFmpeg log level for standard codecs (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show which frames a request compresses.
    #[command(
        about = "Print the compression plan for a frame",
        after_help = "Examples:\n  gopcache plan 4 --clip-len 100\n  gopcache plan 8 --clip-len 15 --forward 6 --backward 6 --json"
    )]
    Plan {
        /// Requested frame index.
        index: usize,
        /// Number of frames in the clip.
        #[arg(long)]
        clip_len: usize,
        /// Forward-P frames per GOP.
        #[arg(long, default_value_t = 6)]
        forward: usize,
        /// Backward-P frames per GOP.
        #[arg(long, default_value_t = 6)]
        backward: usize,
        /// Plan a shared-reference batch instead of prediction chains.
        #[arg(long)]
        parallel: bool,
        /// Frames per batch with --parallel.
        #[arg(long, default_value_t = 4)]
        batch_size: usize,
        /// Treat the index as the first frame of a new clip.
        #[arg(long)]
        new_clip: bool,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Serve a sequence of requests with the pass-through codec.
    #[command(
        about = "Simulate requests against a synthetic clip",
        after_help = "Examples:\n  gopcache simulate --clip-len 40 --requests 3,8,21\n  gopcache simulate --clip-len 40 --requests 0,9,30 --variant batch --batch-size 3 --json"
    )]
    Simulate {
        /// Number of frames in the clip.
        #[arg(long)]
        clip_len: usize,
        /// Comma-separated frame indices, served in order.
        #[arg(long, value_delimiter = ',', required = true)]
        requests: Vec<usize>,
        /// Codec variant: sequential | batch.
        #[arg(long, default_value = "sequential")]
        variant: String,
        /// Forward-P frames per GOP.
        #[arg(long, default_value_t = 6)]
        forward: usize,
        /// Backward-P frames per GOP.
        #[arg(long, default_value_t = 6)]
        backward: usize,
        /// Frames per batch for the batch variant.
        #[arg(long, default_value_t = 4)]
        batch_size: usize,
        /// Synthetic frame width.
        #[arg(long, default_value_t = 32)]
        width: usize,
        /// Synthetic frame height.
        #[arg(long, default_value_t = 32)]
        height: usize,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Encode a directory of images with x264 or x265.
    #[command(
        about = "Encode image frames with a standard codec",
        after_help = "Examples:\n  gopcache encode frames/ --encoder x264\n  gopcache encode frames/ --encoder x265 --crf 19 --keyframe-interval 12 --json"
    )]
    Encode {
        /// Directory of frame images, read in file name order.
        frames: PathBuf,
        /// Encoder: x264 | x265.
        #[arg(long, default_value = "x264")]
        encoder: String,
        /// Constant rate factor.
        #[arg(long, default_value_t = 27)]
        crf: u32,
        /// Keyframe interval.
        #[arg(long, default_value_t = 10)]
        keyframe_interval: u32,
        /// Input frame rate.
        #[arg(long, default_value_t = 25)]
        fps: u32,
        /// Explicit ffmpeg executable.
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the training phase for an epoch.
    #[command(about = "Print loss weights and GOP size for a training epoch")]
    Schedule {
        /// Epoch number; negative epochs are pretraining phases.
        #[arg(long, allow_hyphen_values = true)]
        epoch: i64,
        /// Codec name whose loss combination to describe.
        #[arg(long)]
        codec: Option<String>,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_length(info.frames_planned as u64);
        self.bar.set_position(info.frames_done as u64);
        match info.current_frame {
            Some(frame) => self.bar.set_message(format!("frame {frame}")),
            None => self.bar.set_message(format!("{:?} done", info.operation)),
        }
    }
}

fn gop_size(forward: usize, backward: usize) -> Result<usize, Box<dyn std::error::Error>> {
    GroupOfPictures::new(forward, backward)
        .checked_size()
        .ok_or_else(|| format!("GOP of {forward} + {backward} + 1 frames is too long").into())
}

fn direction_name(direction: PredictionDirection) -> &'static str {
    match direction {
        PredictionDirection::Forward => "forward",
        PredictionDirection::Backward => "backward",
    }
}

fn metrics_json(index: usize, metrics: &FrameMetrics) -> Value {
    json!({
        "index": index,
        "frame_type": metrics.frame_type.to_string(),
        "reference": metrics.reference,
        "end_of_batch": metrics.end_of_batch,
        "bits_estimated": metrics.bits_estimated,
        "bits_actual": metrics.bits_actual,
        "distortion_loss": metrics.distortion_loss,
        "auxiliary_loss": metrics.auxiliary_loss,
        "quality": metrics.quality,
    })
}

fn snapshot_json(snapshot: &CacheSnapshot) -> Value {
    json!({
        "max_proc": snapshot.max_proc,
        "frames": snapshot
            .entries
            .iter()
            .map(|entry| metrics_json(entry.index, &entry.metrics))
            .collect::<Vec<_>>(),
    })
}

fn parse_log_level(value: &str) -> Result<FfmpegLogLevel, Box<dyn std::error::Error>> {
    value
        .parse::<FfmpegLogLevel>()
        .map_err(|_| format!("unsupported --log-level: {value}").into())
}

fn load_frames(directory: &Path) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| {
                    IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
                })
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(format!("no images found in {}", directory.display()).into());
    }

    paths
        .iter()
        .map(|path| -> Result<Frame, Box<dyn std::error::Error>> {
            Ok(Frame::from_rgb_image(&image::open(path)?.to_rgb8()))
        })
        .collect()
}

fn synthetic_clip(
    clip_len: usize,
    height: usize,
    width: usize,
) -> Result<Clip, Box<dyn std::error::Error>> {
    let frames = (0..clip_len)
        .map(|index| Frame::filled(3, height, width, index as f32 / clip_len.max(1) as f32))
        .collect();
    Ok(Clip::new(frames)?)
}

fn progress_options(
    options: CodecOptions,
    global: &GlobalOptions,
) -> Result<CodecOptions, Box<dyn std::error::Error>> {
    if global.progress {
        Ok(options.with_progress(Arc::new(BarProgress::new()?)))
    } else {
        Ok(options)
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let log_level = cli
        .global
        .log_level
        .as_deref()
        .map(parse_log_level)
        .transpose()?;

    match cli.command {
        Commands::Plan {
            index,
            clip_len,
            forward,
            backward,
            parallel,
            batch_size,
            new_clip,
            json,
        } => {
            if parallel {
                let gop = GroupOfPictures::forward_only(gop_size(forward, backward)?)?;
                let plan = gop.plan_batch(index, clip_len, batch_size, new_clip)?;
                if json {
                    let payload = match plan {
                        BatchPlan::Intra(frame) => json!({ "intra": frame, "max_proc": frame }),
                        BatchPlan::Range { start, end } => json!({
                            "start": start,
                            "end": end,
                            "reference": plan.reference(),
                            "max_proc": end,
                        }),
                    };
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                } else {
                    match plan {
                        BatchPlan::Intra(frame) => {
                            println!("{} frame {frame}", "intra".green().bold());
                        }
                        BatchPlan::Range { start, end } => println!(
                            "{} {start}..={end} from frame {}",
                            "batch".cyan().bold(),
                            start - 1
                        ),
                    }
                }
            } else {
                let gop = GroupOfPictures::new(forward, backward);
                let plan = gop.plan(index, clip_len, new_clip)?;
                if json {
                    let payload = json!({
                        "ranges": plan.ranges.iter().map(|range| json!({
                            "direction": direction_name(range.direction),
                            "indices": range.indices().collect::<Vec<_>>(),
                            "reference": range.reference,
                            "anchor": range.anchor,
                        })).collect::<Vec<_>>(),
                        "max_seen": plan.max_seen,
                        "max_proc": plan.max_proc,
                    });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                } else {
                    for range in &plan.ranges {
                        let indices: Vec<String> =
                            range.indices().map(|frame| frame.to_string()).collect();
                        println!(
                            "{:>8} [{}]",
                            direction_name(range.direction).cyan().bold(),
                            indices.join(", ")
                        );
                        if cli.global.verbose {
                            for step in range.steps() {
                                println!(
                                    "         {} <- {:?} (context: {})",
                                    step.index, step.reference, step.predictive_context
                                );
                            }
                        }
                    }
                    println!(
                        "{} max_seen={} max_proc={}",
                        "plan".green().bold(),
                        plan.max_seen,
                        plan.max_proc
                    );
                }
            }
        }
        Commands::Simulate {
            clip_len,
            requests,
            variant,
            forward,
            backward,
            batch_size,
            width,
            height,
            json,
        } => {
            let variant = variant.parse::<CodecVariant>()?;
            let (backend, layout) = match variant {
                CodecVariant::Sequential => (
                    CodecBackend::Sequential(Box::new(RawCodec)),
                    GroupOfPictures::new(forward, backward),
                ),
                CodecVariant::Batch => (
                    CodecBackend::Batch(Box::new(RawCodec)),
                    GroupOfPictures::forward_only(gop_size(forward, backward)?)?,
                ),
                CodecVariant::Subprocess => {
                    return Err("simulate runs the pass-through codec; use `encode` for x264/x265".into());
                }
            };

            let options = CodecOptions::new()
                .with_layout(layout)
                .with_batch_size(batch_size)
                .with_variant(variant);
            let options = progress_options(options, &cli.global)?;
            if cli.global.verbose {
                eprintln!("{}", options.validate());
            }

            let mut compressor = VideoCompressor::new(options, backend)?;
            compressor.start_clip(synthetic_clip(clip_len, height, width)?)?;

            let mut served = Vec::with_capacity(requests.len());
            for index in requests {
                let metrics = compressor.request(index)?;
                if !json {
                    println!(
                        "{} {index:>4} {:<2} ref {:<6} max_seen={:?} max_proc={:?}",
                        "request".cyan().bold(),
                        metrics.frame_type.to_string(),
                        format!("{:?}", metrics.reference),
                        compressor.max_seen(),
                        compressor.max_proc(),
                    );
                }
                served.push(json!({
                    "index": index,
                    "max_seen": compressor.max_seen(),
                    "max_proc": compressor.max_proc(),
                }));
            }

            let snapshot = compressor.snapshot().ok_or("clip is not active")?;
            if json {
                let payload = json!({
                    "requests": served,
                    "snapshot": snapshot_json(&snapshot),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "{} {} of {clip_len} frame(s) decodable ({:?})",
                    "done".green().bold(),
                    snapshot.entries.len(),
                    compressor.state(),
                );
            }
        }
        Commands::Encode {
            frames,
            encoder,
            crf,
            keyframe_interval,
            fps,
            ffmpeg,
            json,
        } => {
            let encoder = encoder.parse::<StandardEncoder>()?;
            let mut standard = StandardCodecOptions::default()
                .with_encoder(encoder)
                .with_crf(crf)
                .with_keyframe_interval(keyframe_interval)
                .with_fps(fps);
            if let Some(level) = log_level {
                standard = standard.with_log_level(level);
            }
            if let Some(path) = ffmpeg {
                standard = standard.with_ffmpeg_path(path);
            }

            let clip = Clip::new(load_frames(&frames)?)?;
            let frame_count = clip.len();
            let options = progress_options(
                CodecOptions::new().with_variant(CodecVariant::Subprocess),
                &cli.global,
            )?;
            let mut compressor = VideoCompressor::new(
                options,
                CodecBackend::Subprocess(Box::new(StandardCodec::new(standard))),
            )?;
            compressor.start_clip(clip)?;

            let snapshot = compressor.snapshot().ok_or("clip is not active")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot_json(&snapshot))?);
            } else {
                for entry in &snapshot.entries {
                    println!(
                        "{:>5}  {:.4} bpp  {:.2} dB",
                        entry.index, entry.metrics.bits_actual, entry.metrics.quality
                    );
                }
                println!(
                    "{} {frame_count} frame(s) with {encoder}",
                    "encoded".green().bold()
                );
            }
        }
        Commands::Schedule { epoch, codec, json } => {
            let phase = TrainingPhase::for_epoch(epoch);
            let family = codec
                .as_deref()
                .map(str::parse::<CodecFamily>)
                .transpose()?;
            if json {
                let payload = json!({
                    "epoch": epoch,
                    "group_of_pictures": phase.group_of_pictures,
                    "task_enabled": phase.task_enabled,
                    "weights": {
                        "bits": phase.weights.bits,
                        "pixel": phase.weights.pixel,
                        "auxiliary": phase.weights.auxiliary,
                        "flow": phase.weights.flow,
                        "application": phase.weights.application,
                    },
                    "family": family.map(|family| family.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Epoch: {epoch}");
                println!("GOP: {}", phase.group_of_pictures);
                println!(
                    "Weights: bits={} pixel={} aux={} flow={} task={}",
                    phase.weights.bits,
                    phase.weights.pixel,
                    phase.weights.auxiliary,
                    phase.weights.flow,
                    phase.weights.application,
                );
                println!(
                    "Task loss: {}",
                    if phase.task_enabled { "on".green() } else { "off".yellow() }
                );
                if let Some(family) = family {
                    println!("Loss family: {family}");
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "gopcache", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
