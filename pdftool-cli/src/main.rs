use anyhow::Result;
use clap::{Parser, Subcommand};
use pdftool::operations::{
    compress_request, convert_request, extract_markdown_request, extract_pages_request,
    extract_text_request, CompressRequest, CompressionProfile, ConvertRequest,
    ExtractPagesRequest, ExtractTextRequest, Outcome, DEFAULT_DPI,
};
use pdftool::{ImageFormat, RenderOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pdftool",
    about = "Extract pages and text, compress and rasterize PDF files",
    version
)]
struct Cli {
    /// Log more detail to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Directory for the output file(s)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Base name of the output file(s), without extension
    #[arg(short, long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy selected pages into a new PDF
    Extract {
        /// Input PDF file
        input: PathBuf,

        /// Pages to extract, in output order (e.g. "1,3-5")
        #[arg(short, long)]
        pages: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Extract the text of every page into a .txt file
    Text {
        /// Input PDF file
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Extract the text of every page into a Markdown file
    Markdown {
        /// Input PDF file
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Recompress images and streams
    Compress {
        /// Input PDF file
        input: PathBuf,

        /// Quality profile: screen, ebook, printer or prepress
        #[arg(short, long, default_value = "ebook")]
        quality: CompressionProfile,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Render every page to an image file
    Convert {
        /// Input PDF file
        input: PathBuf,

        /// Image format: png or jpeg
        #[arg(short, long, default_value = "png")]
        format: ImageFormat,

        /// Resolution in dots per inch (1-2400)
        #[arg(short, long, default_value_t = DEFAULT_DPI)]
        dpi: f64,

        #[command(flatten)]
        output: OutputArgs,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(command: Commands) -> Result<Outcome> {
    let outcome = match command {
        Commands::Extract {
            input,
            pages,
            output,
        } => extract_pages_request(&ExtractPagesRequest {
            input,
            pages,
            output_dir: output.output_dir,
            base_name: output.name,
        })?,

        Commands::Text { input, output } => extract_text_request(&ExtractTextRequest {
            input,
            output_dir: output.output_dir,
            base_name: output.name,
        })?,

        Commands::Markdown { input, output } => extract_markdown_request(&ExtractTextRequest {
            input,
            output_dir: output.output_dir,
            base_name: output.name,
        })?,

        Commands::Compress {
            input,
            quality,
            output,
        } => compress_request(&CompressRequest {
            input,
            profile: quality,
            output_dir: output.output_dir,
            base_name: output.name,
        })?,

        Commands::Convert {
            input,
            format,
            dpi,
            output,
        } => convert_request(&ConvertRequest {
            input,
            format,
            dpi,
            output_dir: output.output_dir,
            base_name: output.name,
            render: RenderOptions::from_env(),
        })?,
    };
    Ok(outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(outcome) => {
            println!("{}", outcome.message);
            for warning in &outcome.warnings {
                eprintln!("Warning: {warning}");
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}
