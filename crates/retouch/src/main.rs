//! retouch: command-line photo editor with a versioned undo/redo history.
//!
//! Every edit is stored as a new version of the image; undo and redo move
//! through the visited versions without discarding any of them. Results
//! are printed to stdout as JSON, logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! retouch upload photo.jpg --user <uuid>
//! retouch remove-background <image-id> --fill transparent
//! retouch crop <image-id> 10 10 200 300
//! retouch undo <image-id>
//! retouch export <image-id> out.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use retouch_history::{Editor, FsBlobStore, ImageId, Placement, SqliteRowStore, UserId};
use retouch_pipeline::{
    BackgroundClassifier, BackgroundFill, CropRect, FaceBox, Point, ResizeFilter, ResizeOptions,
    Seed,
};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;

/// Versioned photo editing from the command line.
#[derive(Parser)]
#[command(name = "retouch", version)]
struct Cli {
    /// Configuration file (default: `<config dir>/retouch/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a photo as version 1 of a new image.
    Upload {
        path: PathBuf,
        #[arg(long)]
        user: UserId,
    },
    /// Replace the background automatically.
    RemoveBackground {
        id: ImageId,
        #[arg(long, value_enum, default_value_t = Fill::Transparent)]
        fill: Fill,
        /// Override the configured classifier.
        #[arg(long, value_enum)]
        classifier: Option<ClassifierArg>,
    },
    /// Clear the regions around the given points.
    FloodFill {
        id: ImageId,
        /// Seed point as `x,y`; repeat for several.
        #[arg(long = "seed", required = true, value_parser = parse_seed)]
        seeds: Vec<Seed>,
        /// Per-channel color tolerance.
        #[arg(long, default_value_t = 32)]
        tolerance: u8,
    },
    /// Crop a rectangle of the uncropped image.
    Crop {
        id: ImageId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Resize towards a target size.
    Resize {
        id: ImageId,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Ignore the aspect ratio.
        #[arg(long)]
        stretch: bool,
        /// Fit inside the target instead of covering and cropping it.
        #[arg(long)]
        no_crop: bool,
        /// Resampling filter (default: from the configuration).
        #[arg(long, value_enum)]
        filter: Option<FilterArg>,
    },
    /// Cartoon stylization.
    Cartoonise { id: ImageId },
    /// Blend a clothing image onto the photo.
    Overlay {
        id: ImageId,
        #[arg(long)]
        clothes: PathBuf,
        /// Target corners as `x,y`, clockwise from the top-left.
        #[arg(long, num_args = 4, value_parser = parse_point, required_unless_present = "face")]
        quad: Option<Vec<Point>>,
        /// Face box as `x,y,width,height`; clothes go below it.
        #[arg(long, value_parser = parse_face, conflicts_with = "quad")]
        face: Option<FaceBox>,
    },
    /// Step back one version.
    Undo { id: ImageId },
    /// Step forward one version.
    Redo { id: ImageId },
    /// Discard the redo history.
    Confirm { id: ImageId },
    /// Show the undo and redo stacks.
    History { id: ImageId },
    /// List every stored version.
    Versions { id: ImageId },
    /// Delete an image with all its versions.
    Delete { id: ImageId },
    /// Write the current version to a PNG file.
    Export { id: ImageId, out: PathBuf },
    /// List a user's images at their current versions.
    Images {
        #[arg(long)]
        user: UserId,
    },
}

/// Background replacement.
#[derive(Clone, Copy, ValueEnum)]
enum Fill {
    White,
    Blue,
    Transparent,
}

impl From<Fill> for BackgroundFill {
    fn from(fill: Fill) -> Self {
        match fill {
            Fill::White => Self::White,
            Fill::Blue => Self::Blue,
            Fill::Transparent => Self::Transparent,
        }
    }
}

/// Background classifier selection.
#[derive(Clone, Copy, ValueEnum)]
enum ClassifierArg {
    /// Pixels with enough near-identical neighbors.
    NeighborSimilarity,
    /// Pixels brighter than the Otsu threshold.
    LuminanceThreshold,
}

impl From<ClassifierArg> for BackgroundClassifier {
    fn from(arg: ClassifierArg) -> Self {
        match arg {
            ClassifierArg::NeighborSimilarity => Self::NeighborSimilarity,
            ClassifierArg::LuminanceThreshold => Self::LuminanceThreshold,
        }
    }
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<FilterArg> for ResizeFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Nearest => Self::Nearest,
            FilterArg::Triangle => Self::Triangle,
            FilterArg::CatmullRom => Self::CatmullRom,
            FilterArg::Gaussian => Self::Gaussian,
            FilterArg::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Split `s` on commas into exactly `N` numbers.
fn parse_tuple<T: FromStr, const N: usize>(s: &str) -> Result<[T; N], String> {
    let parts: Vec<T> = s
        .split(',')
        .map(|part| part.trim().parse::<T>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("expected {N} comma-separated numbers, got {s:?}"))?;
    parts
        .try_into()
        .map_err(|_| format!("expected {N} comma-separated numbers, got {s:?}"))
}

fn parse_seed(s: &str) -> Result<Seed, String> {
    let [x, y] = parse_tuple::<u32, 2>(s)?;
    Ok(Seed::new(x, y))
}

fn parse_point(s: &str) -> Result<Point, String> {
    let [x, y] = parse_tuple::<f64, 2>(s)?;
    Ok(Point::new(x, y))
}

fn parse_face(s: &str) -> Result<FaceBox, String> {
    let [x, y, width, height] = parse_tuple::<u32, 4>(s)?;
    Ok(FaceBox {
        x,
        y,
        width,
        height,
    })
}

fn open_editor(config: &Config) -> Result<Editor<SqliteRowStore, FsBlobStore>> {
    let database = config.database_path();
    if let Some(parent) = database.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let rows = SqliteRowStore::open(&database)
        .with_context(|| format!("opening database {}", database.display()))?;
    let blobs_dir = config.blobs_dir();
    let blobs = FsBlobStore::open(&blobs_dir)
        .with_context(|| format!("opening image store {}", blobs_dir.display()))?;
    debug!(database = %database.display(), blobs = %blobs_dir.display(), "opened workspace");
    Ok(Editor::new(rows, blobs, config.edit.clone()))
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn execute(editor: &Editor<SqliteRowStore, FsBlobStore>, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Upload { path, user } => print_json(&editor.upload(user, &read(&path)?)?),
        Command::RemoveBackground {
            id,
            fill,
            classifier,
        } => print_json(&editor.remove_background(id, fill.into(), classifier.map(Into::into))?),
        Command::FloodFill {
            id,
            seeds,
            tolerance,
        } => print_json(&editor.flood_fill(id, &seeds, tolerance)?),
        Command::Crop {
            id,
            x,
            y,
            width,
            height,
        } => print_json(&editor.crop(id, CropRect::new(x, y, width, height))?),
        Command::Resize {
            id,
            width,
            height,
            stretch,
            no_crop,
            filter,
        } => {
            let options = ResizeOptions {
                maintain_aspect_ratio: !stretch,
                allow_cropping: !no_crop,
                filter: filter.map_or(config.edit.resize_filter, Into::into),
            };
            print_json(&editor.resize(id, width, height, options)?)
        }
        Command::Cartoonise { id } => print_json(&editor.cartoonise(id)?),
        Command::Overlay {
            id,
            clothes,
            quad,
            face,
        } => {
            let placement = match (quad, face) {
                (_, Some(face)) => Placement::Face(face),
                (Some(quad), None) => match <[Point; 4]>::try_from(quad) {
                    Ok(quad) => Placement::Quad(quad),
                    Err(points) => bail!("--quad needs 4 points, got {}", points.len()),
                },
                (None, None) => bail!("either --quad or --face is required"),
            };
            print_json(&editor.overlay_clothes(id, &read(&clothes)?, placement)?)
        }
        Command::Undo { id } => print_json(&editor.undo(id)?),
        Command::Redo { id } => print_json(&editor.redo(id)?),
        Command::Confirm { id } => print_json(&editor.confirm(id)?),
        Command::History { id } => print_json(&editor.get_history(id)?),
        Command::Versions { id } => print_json(&editor.list_versions(id)?),
        Command::Delete { id } => {
            let removed = editor.delete_image(id)?;
            print_json(&serde_json::json!({ "imageId": id, "deletedVersions": removed }))
        }
        Command::Export { id, out } => {
            let bytes = editor.current_bytes(id)?;
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            print_json(&serde_json::json!({ "path": out, "bytes": bytes.len() }))
        }
        Command::Images { user } => print_json(&editor.user_latest(user)?),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.log_filter)?;
    let editor = open_editor(&config)?;
    execute(&editor, &config, cli.command)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_seed_list() {
        let cli = Cli::try_parse_from([
            "retouch",
            "flood-fill",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--seed",
            "1,2",
            "--seed",
            "30, 40",
        ])
        .unwrap();
        let Command::FloodFill { seeds, tolerance, .. } = cli.command else {
            unreachable!("parsed the wrong subcommand");
        };
        assert_eq!(seeds, vec![Seed::new(1, 2), Seed::new(30, 40)]);
        assert_eq!(tolerance, 32);
    }

    #[test]
    fn overlay_takes_four_corners() {
        let cli = Cli::try_parse_from([
            "retouch",
            "overlay",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--clothes",
            "shirt.png",
            "--quad",
            "0,0",
            "10,0",
            "10,10",
            "0,10",
        ])
        .unwrap();
        let Command::Overlay { quad, face, .. } = cli.command else {
            unreachable!("parsed the wrong subcommand");
        };
        assert_eq!(quad.unwrap().len(), 4);
        assert!(face.is_none());
    }

    #[test]
    fn overlay_needs_a_placement() {
        let result = Cli::try_parse_from([
            "retouch",
            "overlay",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--clothes",
            "shirt.png",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_ids_and_tuples() {
        assert!(Cli::try_parse_from(["retouch", "undo", "not-a-uuid"]).is_err());
        assert!(parse_seed("1").is_err());
        assert!(parse_seed("1,2,3").is_err());
        assert!(parse_face("1,2,x,4").is_err());
        assert_eq!(
            parse_face("1,2,3,4").unwrap(),
            FaceBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4
            }
        );
    }

    #[test]
    fn end_to_end_through_a_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            workspace: dir.path().to_path_buf(),
            ..Config::default()
        };
        let editor = open_editor(&config).unwrap();
        let pixels = retouch_pipeline::RgbaImage::from_raw(8, 8, vec![128; 8 * 8 * 4]).unwrap();
        let photo = retouch_pipeline::encode_png(&pixels).unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, photo).unwrap();

        let user = UserId::random();
        execute(&editor, &config, Command::Upload { path, user }).unwrap();
        let id = editor.user_images(user).unwrap()[0];
        execute(&editor, &config, Command::Cartoonise { id }).unwrap();
        execute(&editor, &config, Command::Undo { id }).unwrap();

        let out = dir.path().join("out.png");
        execute(&editor, &config, Command::Export { id, out: out.clone() }).unwrap();
        assert!(out.exists());
        assert!(config.database_path().exists());
        assert_eq!(editor.get_history(id).unwrap().redo_stack, vec![2]);
    }
}
