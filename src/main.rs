use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use voxel_export::{
    AnatomySource, ConversionOptions, ConversionOutput, Converter, OutputPaths, ReferenceGrid,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Convert medical image studies into raw voxel buffers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON file with conversion options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not write a downsampled preview pair
    #[arg(long, global = true)]
    no_preview: bool,

    /// Linear scale of the preview volume
    #[arg(long, global = true)]
    preview_scale: Option<f64>,
}

#[derive(Args, Debug)]
struct Outputs {
    /// Destination of the binary voxel buffer
    #[arg(long)]
    out: PathBuf,

    /// Destination of the JSON metadata record
    #[arg(long)]
    meta: PathBuf,
}

impl Outputs {
    fn paths(&self) -> OutputPaths {
        OutputPaths::new(&self.out, &self.meta)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a DICOM series or NIfTI scan and write the reference metadata
    Anatomy {
        /// Directory of DICOM slices
        #[arg(long, conflicts_with = "nifti", required_unless_present = "nifti")]
        dicom_dir: Option<PathBuf>,

        /// NIfTI volume
        #[arg(long)]
        nifti: Option<PathBuf>,

        #[command(flatten)]
        outputs: Outputs,
    },
    /// Convert a NIfTI label mask
    Segmentation {
        #[arg(long)]
        nifti: PathBuf,

        /// Reference metadata written by the anatomy conversion
        #[arg(long)]
        reference: Option<PathBuf>,

        #[command(flatten)]
        outputs: Outputs,
    },
    /// Rasterize landmark markups onto the reference grid
    Landmarks {
        /// Reference metadata written by the anatomy conversion
        #[arg(long)]
        reference: PathBuf,

        #[command(flatten)]
        outputs: Outputs,

        /// Markup files or directories of markup files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn options(common: &CommonArgs) -> voxel_export::Result<ConversionOptions> {
    let mut options = match &common.config {
        Some(path) => ConversionOptions::from_file(path)?,
        None => ConversionOptions::default(),
    };
    if common.no_preview {
        options = options.with_preview(false);
    }
    if let Some(scale) = common.preview_scale {
        options = options.with_preview_scale(scale);
    }
    Ok(options)
}

fn run(cli: Cli) -> voxel_export::Result<ConversionOutput> {
    let converter = Converter::new(options(&cli.common)?);
    match cli.command {
        Command::Anatomy {
            dicom_dir,
            nifti,
            outputs,
        } => {
            let source = match (dicom_dir, nifti) {
                (Some(dir), _) => AnatomySource::DicomDirectory(dir),
                (None, Some(path)) => AnatomySource::Nifti(path),
                (None, None) => {
                    return Err(voxel_export::ConversionError::ConversionFailed(
                        "either --dicom-dir or --nifti is required".to_string(),
                    ));
                }
            };
            converter.convert_anatomy(&source, &outputs.paths())
        }
        Command::Segmentation {
            nifti,
            reference,
            outputs,
        } => {
            let reference = match reference {
                Some(path) => ReferenceGrid::load_optional(path)?,
                None => None,
            };
            converter.convert_segmentation(nifti, reference.as_ref(), &outputs.paths())
        }
        Command::Landmarks {
            reference,
            outputs,
            inputs,
        } => {
            let reference = ReferenceGrid::load(reference)?;
            converter.convert_landmarks(&inputs, &reference, &outputs.paths())
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(Cli::parse()) {
        Ok(output) => {
            for (input, reason) in &output.skipped {
                warn!(%input, %reason, "input skipped");
            }
            println!("{}", output.paths.bin.display());
            println!("{}", output.paths.meta.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
