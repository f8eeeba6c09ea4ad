use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::path::PathBuf;

use oci2plugin::notifier::VerbosityLevel;
use oci2plugin::report::missing_files;
use oci2plugin::{FileSpec, LayerWalker, LocalImage, Notifier, Platform, PluginPlatform};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(help = "OCI image layout directory or image tarball (docker save / OCI archive)")]
    image: PathBuf,

    #[arg(
        short,
        long,
        default_value = "./plugin.tar.gz",
        help = "Output archive (gzip-compressed tar)"
    )]
    output: PathBuf,

    #[arg(
        short,
        long,
        conflicts_with = "files",
        help = "Plugin platform manifest (JSON) listing the files to extract"
    )]
    manifest: Option<PathBuf>,

    #[arg(
        short = 'f',
        long = "file",
        value_name = "FROM[:TO]",
        required_unless_present = "manifest",
        help = "File to extract; may be repeated"
    )]
    files: Vec<String>,

    #[arg(
        short,
        long,
        value_name = "OS/ARCH[/VARIANT]",
        help = "Platform to select from a multi-platform image (overrides the manifest's)"
    )]
    platform: Option<String>,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(VerbosityLevel::from(cli.verbose).to_log_level())
        .init();

    let notifier = Notifier::new(cli.verbose);

    let (files, manifest_platform) = match &cli.manifest {
        Some(path) => {
            let plugin = PluginPlatform::load(path)?;
            let platform = plugin.platform()?;
            (plugin.files, platform)
        }
        None => (
            cli.files
                .iter()
                .map(|f| FileSpec::parse_flag(f))
                .collect::<Result<Vec<_>>>()?,
            None,
        ),
    };

    let platform = match &cli.platform {
        Some(p) => Some(p.parse::<Platform>()?),
        None => manifest_platform,
    };

    info!("Extracting {} files from {}", files.len(), cli.image.display());
    debug!("Output archive: {}", cli.output.display());
    debug!("Platform: {:?}", platform);

    notifier.info("Loading image...");
    let image = LocalImage::open(&cli.image, platform.as_ref())?;

    let extraction = LayerWalker::new(&notifier)
        .extract(&image, &files, &cli.output)
        .with_context(|| format!("Failed to extract files from {}", cli.image.display()))?;
    notifier.finish();

    for missing in missing_files(&files, &extraction.locations) {
        notifier.warn(&format!("{} not found in image", missing.from));
    }
    if !extraction.warnings.is_empty() {
        notifier.warn(&format!(
            "{} files could not be written to {}",
            extraction.warnings.len(),
            extraction.archive.display()
        ));
    }

    let report = serde_json::to_string_pretty(&extraction.locations)
        .map_err(|e| anyhow!("Failed to serialize result: {}", e))?;
    println!("{}", report);

    Ok(())
}
