use anyhow::Result;
use clap::{Parser, Subcommand};

use page_overlay_rust::{Command, Config};

#[derive(Parser, Debug)]
#[command(
    name = "page-overlay-rust",
    version,
    about = "Recognize text on scanned pages and overlay translations in place"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging (stderr)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run the detector passes over an image and store the consolidated page
    Scan {
        /// Page image (png/jpeg/webp/...)
        image: String,

        /// Page id to store under (default: image file stem)
        #[arg(short = 'p', long = "page")]
        page: Option<String>,

        /// Recorded detections (JSON) to use instead of tesseract; repeat in pass order
        #[arg(short = 'd', long = "detections")]
        detections: Vec<String>,
    },
    /// Translate every region of a stored page in one batch
    Translate {
        page: String,

        /// Target language (default: settings [translation] target_lang)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,

        /// Gemini API key (overrides GEMINI_API_KEY)
        #[arg(short = 'k', long = "key")]
        key: Option<String>,

        /// Overwrite manually edited regions too
        #[arg(long = "force")]
        force: bool,
    },
    /// Edit one region by hand
    Edit {
        page: String,
        region: String,

        /// Replacement translation; marks the region as manually edited
        #[arg(short = 't', long = "text", conflicts_with = "reset")]
        text: Option<String>,

        /// Clear the manual-edit mark so the next translation may overwrite it
        #[arg(long = "reset")]
        reset: bool,

        /// Fixed font size for this region
        #[arg(long = "font-size", conflicts_with = "auto_size")]
        font_size: Option<f32>,

        /// Return to shrink-to-fit sizing
        #[arg(long = "auto-size")]
        auto_size: bool,
    },
    /// Draw the overlay onto the page image (svg/png/jpeg/webp by extension)
    Render {
        page: String,
        image: String,

        #[arg(short = 'o', long = "output")]
        output: String,

        /// Surface width in pixels (default: image width)
        #[arg(long = "width")]
        width: Option<u32>,

        /// Surface height in pixels (default: image height)
        #[arg(long = "height")]
        height: Option<u32>,

        /// Show recognized text instead of translations
        #[arg(long = "original")]
        original: bool,
    },
    /// Print the region under a point of a render surface
    Hit {
        page: String,
        x: f32,
        y: f32,

        #[arg(long = "width")]
        width: f32,

        #[arg(long = "height")]
        height: f32,
    },
    /// Fit text into a box and print the chosen size and lines
    Layout {
        text: String,

        #[arg(long = "width")]
        width: f32,

        #[arg(long = "height")]
        height: f32,

        /// Wrap at this size instead of shrinking to fit
        #[arg(long = "font-size")]
        font_size: Option<f32>,
    },
    /// Print a stored page
    Show {
        page: String,

        /// Print the stored JSON blob
        #[arg(long = "json")]
        json: bool,
    },
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Scan {
                image,
                page,
                detections,
            } => Command::Scan {
                image,
                page,
                detections,
            },
            CliCommand::Translate {
                page,
                lang,
                key,
                force,
            } => Command::Translate {
                page,
                lang,
                key,
                force,
            },
            CliCommand::Edit {
                page,
                region,
                text,
                reset,
                font_size,
                auto_size,
            } => Command::Edit {
                page,
                region,
                text,
                reset,
                font_size,
                auto_size,
            },
            CliCommand::Render {
                page,
                image,
                output,
                width,
                height,
                original,
            } => Command::Render {
                page,
                image,
                output,
                width,
                height,
                original,
            },
            CliCommand::Hit {
                page,
                x,
                y,
                width,
                height,
            } => Command::Hit {
                page,
                x,
                y,
                width,
                height,
            },
            CliCommand::Layout {
                text,
                width,
                height,
                font_size,
            } => Command::Layout {
                text,
                width,
                height,
                font_size,
            },
            CliCommand::Show { page, json } => Command::Show { page, json },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    page_overlay_rust::logging::init(cli.verbose)?;
    let config = Config {
        settings_path: cli.read_settings,
        command: cli.command.into(),
    };
    let output = page_overlay_rust::run(config).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
