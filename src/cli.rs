// ============================================================================
// Tapfill CLI — headless segmentation and fill queries
// ============================================================================
//
// Usage examples:
//   tapfill -i page.png                           (segment, print diagnostics)
//   tapfill -i page.png --fill 120,80 -o mask.png (write the region under a point)
//   tapfill -i pages/*.png --grid 8x8 --verbose
//   tapfill -i page.png --on-demand --fill 10,10 --state drawing.tpf
//   tapfill -i page.png --fill 40,40 --restore drawing.tpf --state drawing.tpf
//   tapfill -i page.png --grid 8x8 --save-settings
//
// Line art is used as-is: the alpha channel is the outline channel.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::canvas::PixelBuffer;
use crate::components::stroke::StrokeStyle;
use crate::geometry::Point;
use crate::components::spatial_index::SpatialIndex;
use crate::io::{SavedDrawing, load_line_art, write_fill_png};
use crate::ops::region_query::query_fill;
use crate::ops::segmentation::segment;
use crate::project::{ColoringSession, GesturePhase, InputDevice, InputSample};
use crate::settings::ColoringSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Tapfill headless region tool.
///
/// Segment line art into fillable regions and query the region under a point.
#[derive(Parser, Debug)]
#[command(
    name = "tapfill",
    about = "Tapfill headless line-art segmentation",
    long_about = "Segment line-art PNGs into enclosed fill regions and query the\n\
                  region under a pixel. Fully opaque pixels are outlines.\n\n\
                  Example:\n  \
                  tapfill --input page.png --fill 120,80 --output mask.png\n  \
                  tapfill -i pages/*.png --grid 8x8 --verbose"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "pages/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Skip segmentation and answer fill queries by flood fill.
    #[arg(long)]
    pub on_demand: bool,

    /// Spatial index divisions as COLSxROWS (default from settings, 4x4).
    #[arg(long, value_name = "NxM", value_parser = parse_grid)]
    pub grid: Option<(u32, u32)>,

    /// Query the region containing this pixel.
    #[arg(long, value_name = "X,Y", value_parser = parse_pixel)]
    pub fill: Option<(u32, u32)>,

    /// Where to write the queried region mask (8-bit gray PNG of its
    /// bounding rectangle). Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for masks in batch mode.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Tap the --fill point with the configured stroke and save the drawing.
    #[arg(long, value_name = "FILE", requires = "fill")]
    pub state: Option<PathBuf>,

    /// Continue a saved drawing: its snapshot becomes the starting picture
    /// and its mode is used unless --on-demand is given.
    #[arg(long, value_name = "FILE", requires = "state")]
    pub restore: Option<PathBuf>,

    /// Store the effective --grid / --on-demand choice as the new defaults.
    #[arg(long)]
    pub save_settings: bool,

    /// Print per-file timing and index statistics.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && (args.output.is_some() || args.state.is_some()) {
        eprintln!(
            "error: {} input files given but --output/--state/--restore only accept a single file.\n\
             Use --output-dir to collect masks for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let mut settings = ColoringSettings::load();
    if args.on_demand {
        settings.precomputed = false;
    }
    if let Some((x, y)) = args.grid {
        settings.grid_x = x;
        settings.grid_y = y;
    }
    if let Err(e) = settings.validate() {
        crate::log_err!("Invalid configuration: {}", e);
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    if args.save_settings {
        settings.save();
    }

    let restored = match &args.restore {
        Some(path) => match SavedDrawing::load(path) {
            Ok(saved) => {
                if !args.on_demand {
                    settings.precomputed = saved.precomputed;
                }
                Some(saved)
            }
            Err(e) => {
                eprintln!("error: could not restore '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();
        let mask_path = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
        );

        match run_one(input_path, &settings, &args, mask_path.as_deref(), restored.as_ref()) {
            Ok(()) => {
                if args.verbose {
                    println!(
                        "  done ({:.0}ms)",
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    settings: &ColoringSettings,
    args: &CliArgs,
    mask_path: Option<&Path>,
    restored: Option<&SavedDrawing>,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let buffer = load_line_art(input).map_err(|e| format!("load failed: {}", e))?;
    println!(
        "  {}x{} px, {} fillable",
        buffer.width(),
        buffer.height(),
        buffer.fillable_count()
    );

    // -- Step 2: Segment (precomputed mode) --------------------------------
    let index = if settings.precomputed {
        let (index, report) = segment(&buffer, settings.grid_x, settings.grid_y)
            .map_err(|e| format!("segmentation failed: {}", e))?;
        println!(
            "  {} regions, {} raw bytes → {} compressed ({} ms)",
            report.mask_count, report.raw_bytes, report.compressed_bytes, report.elapsed_ms
        );
        if args.verbose {
            print_cell_stats(&index);
        }
        Some(Arc::new(index))
    } else {
        println!("  on-demand mode, no segmentation");
        None
    };

    // -- Step 3: Query (optional) ----------------------------------------
    let Some((x, y)) = args.fill else {
        return Ok(());
    };
    match query_fill(&buffer, index.as_deref(), x, y) {
        Some(fill) => {
            let b = fill.bounds();
            println!(
                "  region at ({}, {}): bounds ({}, {}, {}x{}), {} px",
                x,
                y,
                b.x,
                b.y,
                b.width,
                b.height,
                fill.member_count()
            );
            if let Some(path) = mask_path {
                write_fill_png(&fill, path).map_err(|e| format!("mask save failed: {}", e))?;
                println!("  → {}", path.display());
            }
        }
        None => println!("  no region at ({}, {})", x, y),
    }

    // -- Step 4: Saved drawing (optional) --------------------------------
    if let Some(state_path) = &args.state {
        tap_and_save(buffer, settings, index, restored, (x, y), state_path)?;
        println!("  → {}", state_path.display());
    }
    Ok(())
}

/// Drive a session (reusing the index built for this file) through one tap
/// at `pixel` and write the result.
fn tap_and_save(
    buffer: PixelBuffer,
    settings: &ColoringSettings,
    index: Option<Arc<SpatialIndex>>,
    restored: Option<&SavedDrawing>,
    pixel: (u32, u32),
    path: &Path,
) -> Result<(), String> {
    let mut session = ColoringSession::new(buffer, settings.clone(), index)
        .map_err(|e| format!("session failed: {}", e))?;
    if let Some(saved) = restored {
        session
            .restore_snapshot(saved.snapshot_png.clone())
            .map_err(|e| format!("restore failed: {}", e))?;
    }
    let scale = settings.display_scale;
    let point = Point::new(
        (pixel.0 as f32 + 0.5) / scale,
        (pixel.1 as f32 + 0.5) / scale,
    );
    let style = StrokeStyle::from_settings(settings);
    session.handle_input(
        &InputSample::new(vec![point], InputDevice::Pencil, GesturePhase::Begin, 0.0),
        style,
    );
    session.handle_input(
        &InputSample::new(Vec::new(), InputDevice::Pencil, GesturePhase::End, 0.0),
        style,
    );
    session.finish_pending_fills();

    let saved = session
        .saved_drawing()
        .map_err(|e| format!("snapshot failed: {}", e))?;
    saved
        .save(path)
        .map_err(|e| format!("state save failed: {}", e))
}

fn print_cell_stats(index: &SpatialIndex) {
    let (cols, rows) = index.divisions();
    for cy in 0..rows {
        let counts: Vec<String> = (0..cols)
            .map(|cx| format!("{:4}", index.cell(cx, cy).len()))
            .collect();
        println!("  cells row {}: {}", cy, counts.join(" "));
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_grid(s: &str) -> Result<(u32, u32), String> {
    let (x, y) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected COLSxROWS, got '{}'", s))?;
    let x = x.trim().parse().map_err(|_| format!("bad column count '{}'", x))?;
    let y = y.trim().parse().map_err(|_| format!("bad row count '{}'", y))?;
    Ok((x, y))
}

fn parse_pixel(s: &str) -> Result<(u32, u32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{}'", s))?;
    let x = x.trim().parse().map_err(|_| format!("bad x '{}'", x))?;
    let y = y.trim().parse().map_err(|_| format!("bad y '{}'", y))?;
    Ok((x, y))
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Mask destination for one input: `--output` wins, then `--output-dir`
/// with `<stem>_mask.png`.  `None` means no mask file is written.
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let dir = output_dir?;
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    Some(dir.join(format!("{}_mask.png", stem)))
}
