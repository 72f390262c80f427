use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use videosnap::{
    config::Config,
    filters::{KeyframeTrack, ParamMap, ParamValue},
    logging::init_logging,
    Editor,
};

#[derive(Parser)]
#[command(
    name = "videosnap",
    version,
    about = "Trim, split, filter, composite and track video from the command line",
    long_about = "videosnap is a native video-editing pipeline. Every operation renders through a validated, cancellable job and only replaces the output file once rendering has succeeded."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print media metadata
    Info {
        input: PathBuf,

        /// Print JSON instead of a text summary
        #[arg(long)]
        json: bool,
    },

    /// Keep [start, end) seconds of the input
    Trim {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
    },

    /// Cut the input in two at a point in seconds
    Split {
        input: PathBuf,
        first: PathBuf,
        second: PathBuf,
        #[arg(long)]
        at: f64,
    },

    /// Apply a named effect (grayscale, sepia, invert, oldfilm, ...)
    Effect {
        input: PathBuf,
        output: PathBuf,
        name: String,

        /// Effect parameter as key=value; repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Re-encode with a named preset (low, medium, high, source)
    Export {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long, default_value = "source")]
        preset: String,
    },

    /// Mix the audio of several files into one audio file
    Mix {
        #[arg(short, long, required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Animate an effect parameter, e.g. `sepia.amount` with `0:0,2:1`
    Keyframe {
        input: PathBuf,
        output: PathBuf,
        property: String,
        keyframes: KeyframeTrack,
    },

    /// Draw text onto every frame
    Text {
        input: PathBuf,
        output: PathBuf,
        text: String,
        #[arg(short, default_value_t = 0.0)]
        x: f64,
        #[arg(short, default_value_t = 0.0)]
        y: f64,
        #[arg(long, default_value_t = 24.0)]
        font_size: f64,

        /// ARGB colour as 0xAARRGGBB, #AARRGGBB or decimal
        #[arg(long, default_value = "0xFFFFFFFF", value_parser = parse_color)]
        color: u32,
    },

    /// Composite a foreground video over a background
    Pip {
        background: PathBuf,
        foreground: PathBuf,
        output: PathBuf,
        #[arg(short, default_value_t = 0.0)]
        x: f64,
        #[arg(short, default_value_t = 0.0)]
        y: f64,
        #[arg(long)]
        width: f64,
        #[arg(long)]
        height: f64,
    },

    /// Change playback speed with a constant rate or a keyframed speed map
    Speed {
        input: PathBuf,
        output: PathBuf,
        speed_map: String,
    },

    /// Track a rectangular region and write its trajectory as JSON
    Track {
        input: PathBuf,
        output: PathBuf,
        #[arg(short)]
        x: i32,
        #[arg(short)]
        y: i32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },

    /// Write the audio track of a media file to an audio file
    ExtractAudio { input: PathBuf, output: PathBuf },

    /// List available effects
    Filters,
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn parse_color(s: &str) -> std::result::Result<u32, String> {
    let t = s.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix('#')) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => t.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid colour '{}': {}", s, e))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)
            .with_context(|| format!("loading configuration from {:?}", config_path))?,
        None => Config::default(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    // Initialize logging
    init_logging(&config.logging);
    info!("Starting videosnap v{}", env!("CARGO_PKG_VERSION"));

    let editor = Editor::new(config)?;
    let outcome = run(&editor, cli.command).await;
    editor.shutdown();
    outcome
}

async fn run(editor: &Editor, command: Command) -> Result<()> {
    match command {
        Command::Info { input, json } => {
            let info = editor.get_video_info(&input)?;
            if json {
                print_json(&info)?;
            } else {
                println!("{}", info);
            }
        }
        Command::Trim {
            input,
            output,
            start,
            end,
        } => print_json(&editor.trim(&input, &output, start, end).await?)?,
        Command::Split {
            input,
            first,
            second,
            at,
        } => print_json(&editor.split(&input, &first, &second, at).await?)?,
        Command::Effect {
            input,
            output,
            name,
            params,
        } => {
            let params = params
                .into_iter()
                .fold(ParamMap::new(), |map, (k, v)| map.with(k, ParamValue::parse_loose(&v)));
            print_json(&editor.apply_effect_with(&input, &output, &name, params).await?)?
        }
        Command::Export { input, output, preset } => print_json(&editor.export(&input, &output, &preset).await?)?,
        Command::Mix { inputs, output } => print_json(&editor.mix_audio(&inputs, &output).await?)?,
        Command::Keyframe {
            input,
            output,
            property,
            keyframes,
        } => print_json(
            &editor
                .apply_keyframe_effect(&input, &output, &property, keyframes)
                .await?,
        )?,
        Command::Text {
            input,
            output,
            text,
            x,
            y,
            font_size,
            color,
        } => print_json(
            &editor
                .apply_text_overlay(&input, &output, &text, x, y, font_size, color)
                .await?,
        )?,
        Command::Pip {
            background,
            foreground,
            output,
            x,
            y,
            width,
            height,
        } => print_json(
            &editor
                .apply_pip(&background, &foreground, &output, x, y, width, height)
                .await?,
        )?,
        Command::Speed {
            input,
            output,
            speed_map,
        } => print_json(&editor.apply_speed_ramp(&input, &output, &speed_map).await?)?,
        Command::Track {
            input,
            output,
            x,
            y,
            width,
            height,
        } => {
            let trajectory = editor.track_motion(&input, &output, x, y, width, height).await?;
            if let Some(frame) = trajectory.lost_at {
                warn!("Tracking lost at frame {}; trajectory covers {} frames", frame, trajectory.len());
            }
            println!("{}", trajectory.to_json()?);
        }
        Command::ExtractAudio { input, output } => print_json(&editor.extract_audio(&input, &output).await?)?,
        Command::Filters => {
            for name in editor.registry().list_filters() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
