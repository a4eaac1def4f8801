use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;

use imgpeek::render::{self, RenderOptions};
use imgpeek::source::{Platform, SourceOptions};
use imgpeek::theme::Theme;
use imgpeek::{CatOptions, LayerQuery, MatchPolicy};

mod logging;

#[derive(Parser)]
#[command(name = "imgpeek")]
#[command(about = "Inspect the layers, build history and files of OCI/Docker images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Platform to pick from multi-platform images (os/arch[/variant])
    #[arg(long, global = true)]
    platform: Option<Platform>,

    /// When to colorize output
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    /// Custom theme as JSON string (e.g., '{"directory":"#7daea3"}')
    #[arg(long, global = true)]
    theme: Option<String>,

    /// Docker CLI config file with registry credentials
    #[arg(long, global = true)]
    docker_config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// List the layers of an image with their compressed sizes
    Layers {
        /// Image reference, or docker-archive:<path> for a `docker save` tarball
        image: String,

        /// Only show this layer (1-based)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        layer: Option<u32>,

        /// Walk each layer and count the files it contains
        #[arg(long)]
        scan: bool,
    },

    /// Show the build history and the layer each step produced
    History {
        /// Image reference, or docker-archive:<path>
        image: String,
    },

    /// List the files stored in one layer
    #[command(visible_alias = "filesystem")]
    Fs {
        /// Image reference, or docker-archive:<path>
        image: String,

        /// Layer to list (1-based)
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        layer: u32,
    },

    /// Print the raw content of a file from one layer
    Cat {
        /// Image reference, or docker-archive:<path>
        image: String,

        /// Path of the file inside the layer
        path: String,

        /// Layer to read from (1-based)
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        layer: u32,

        /// Use the last copy of the path when the layer stores it twice
        #[arg(long)]
        last_match: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Determine if we should use color
    let use_color = match cli.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => atty::is(atty::Stream::Stdout),
    };

    // Load theme
    let theme = match &cli.theme {
        Some(json) => Theme::from_json(json).context("Failed to parse theme JSON")?,
        None => Theme::default(),
    };

    let render_options = RenderOptions { use_color, theme };
    let source_options = SourceOptions {
        platform: cli.platform,
        docker_config: cli.docker_config,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Layers { image, layer, scan } => {
            let image = resolve(&image, &source_options)?;
            let query = LayerQuery {
                only: layer.map(|n| n as usize),
                scan_contents: scan,
            };
            let report = imgpeek::list_layers(&image, &query)?;
            render::render_layers(&mut out, &report, &render_options)?;
        }
        Command::History { image } => {
            let image = resolve(&image, &source_options)?;
            let report = imgpeek::reconcile(&image);
            render::render_history(&mut out, &report, &render_options)?;
        }
        Command::Fs { image, layer } => {
            let image = resolve(&image, &source_options)?;
            let listing = imgpeek::explore_filesystem(&image, layer as usize)?;
            render::render_listing(&mut out, &listing, &render_options)?;
        }
        Command::Cat {
            image,
            path,
            layer,
            last_match,
        } => {
            let image = resolve(&image, &source_options)?;
            let options = CatOptions {
                policy: if last_match {
                    MatchPolicy::Last
                } else {
                    MatchPolicy::First
                },
            };
            imgpeek::cat_file(&image, layer as usize, &path, &options, &mut out)
                .with_context(|| format!("Failed to read {path} from layer {layer}"))?;
        }
    }

    out.flush()?;
    Ok(())
}

fn resolve(reference: &str, options: &SourceOptions) -> Result<imgpeek::Image> {
    imgpeek::open_source(reference, options).with_context(|| format!("Failed to open image {reference}"))
}
