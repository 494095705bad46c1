//! voxie command-line interface.
//!
//! Inspects container files and runs the XRF cluster correction on stored
//! cluster lists.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use voxie_algorithms::{
    correct_parallel, is_time_sorted, sort_by_timestamp, Cluster, XrfCorrectionSettings,
};
use voxie_io::{read_xrf_settings, write_clusters, write_xrf_settings, File, Group, Location};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container error: {0}")]
    Container(#[from] voxie_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] voxie_core::Error),

    #[error("Invalid settings file: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Volume and cluster data tooling.
#[derive(Parser)]
#[command(name = "voxie")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the groups, datasets and attributes of a container file
    Info {
        /// Input container file
        input: PathBuf,
    },

    /// Merge XRF escape clusters into their parent clusters
    XrfCorrect {
        /// Input container file
        input: PathBuf,

        /// Output container file
        #[arg(short, long)]
        output: PathBuf,

        /// Path of the cluster dataset, in both input and output
        #[arg(short, long, default_value = "clusters")]
        dataset: String,

        /// JSON file with correction settings
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Lower bound of the accepted energy band
        #[arg(long)]
        min_energy: Option<f32>,

        /// Upper bound of the accepted energy band
        #[arg(long)]
        max_energy: Option<f32>,

        /// Maximum planar distance between merge partners
        #[arg(long)]
        distance_limit: Option<f32>,

        /// Maximum timestamp difference between merge partners (ticks)
        #[arg(long)]
        temporal_margin: Option<u64>,

        /// Also export the corrected clusters to an HDF5 file
        #[cfg(feature = "hdf5")]
        #[arg(long)]
        hdf5: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { input } => {
            let file = File::open(&input)?;
            println!("File: {}", input.display());
            println!("Byte order: {:?}", file.byte_order()?);
            print_attrs(&file, 1)?;
            print_group(&file, 1)?;
        }

        Commands::XrfCorrect {
            input,
            output,
            dataset,
            settings,
            min_energy,
            max_energy,
            distance_limit,
            temporal_margin,
            #[cfg(feature = "hdf5")]
            hdf5,
        } => {
            let source = File::open(&input)?;
            let stored = source.dataset(&dataset)?;
            let mut clusters: Vec<Cluster> = stored.read()?;

            let mut settings = match settings {
                Some(path) => load_settings(&path)?,
                None => read_xrf_settings(&stored)?.unwrap_or_default(),
            };
            settings.enabled = true;
            if let Some(v) = min_energy {
                settings.min_energy = v;
            }
            if let Some(v) = max_energy {
                settings.max_energy = v;
            }
            if let Some(v) = distance_limit {
                settings.distance_limit = v;
            }
            if let Some(v) = temporal_margin {
                settings.temporal_margin = v;
            }
            settings.validate()?;
            source.close()?;

            if !is_time_sorted(&clusters) {
                log::info!("input clusters are not time sorted, sorting");
                sort_by_timestamp(&mut clusters);
            }

            let start = Instant::now();
            let before = clusters.len();
            let stats = correct_parallel(&mut clusters, &settings);
            let elapsed = start.elapsed();
            log::debug!("correction statistics: {:?}", stats);

            let target = File::create(&output)?;
            let (parent, name) = parent_group(&target, &dataset)?;
            let written = write_clusters(&parent, name, &clusters)?;
            write_xrf_settings(&written, &settings)?;
            target.close()?;

            #[cfg(feature = "hdf5")]
            if let Some(path) = hdf5 {
                voxie_io::hdf5::export_clusters(&path, &clusters, Some(&settings))?;
                println!("Exported HDF5: {}", path.display());
            }

            println!(
                "Corrected {} clusters in {:.2}s",
                before,
                elapsed.as_secs_f64()
            );
            println!("Merges: {}", stats.merged);
            println!("Remaining clusters: {}", clusters.len());
        }
    }

    Ok(())
}

fn load_settings(path: &Path) -> Result<XrfCorrectionSettings> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Creates the groups leading to `path` and returns the innermost one with
/// the final name component.
fn parent_group<'a>(file: &File, path: &'a str) -> Result<(Group, &'a str)> {
    let path = path.trim_start_matches('/');
    let (dirs, name) = path.rsplit_once('/').unwrap_or(("", path));
    let mut group = file.root().clone();
    for part in dirs.split('/').filter(|p| !p.is_empty()) {
        group = if group.exists(part)? {
            group.group(part)?
        } else {
            group.create_group(part)?
        };
    }
    Ok((group, name))
}

fn print_group(group: &Group, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    for name in group.member_names()? {
        if group.is_group(&name)? {
            let child = group.group(&name)?;
            println!("{indent}{name}/");
            print_attrs(&child, depth + 1)?;
            print_group(&child, depth + 1)?;
        } else {
            let dataset = group.dataset(&name)?;
            println!(
                "{indent}{name}: {} {:?} ({} bytes)",
                dataset.dtype()?,
                dataset.shape()?,
                dataset.storage_size()?
            );
            print_attrs(&dataset, depth + 1)?;
        }
    }
    Ok(())
}

fn print_attrs(location: &Location, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    for name in location.attr_names()? {
        println!("{indent}@{name}: {}", location.attr_dtype(&name)?);
    }
    Ok(())
}
