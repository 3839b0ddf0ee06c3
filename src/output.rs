//! CLI output formatting.
//!
//! Every formatter is a pure function returning display lines, so output can
//! be tested without capturing stdout. `print_*` wrappers write the lines.
//!
//! # Output Format
//!
//! ## Toasting
//!
//! ```text
//! [1/2] SPHEREx_LinesRB_equirectangular.tif
//!     Source: 8192×4096, 3 channels → depth 5
//!     Level 5: 1024 tiles
//!     Level 4: 256 tiles
//!     ...
//!     Rewrote WTML URLs with base: /SPHEREx_LinesRB_toast/ (builtin)
//!     Toasted SPHEREx_LinesRB_equirectangular.tif → ./SPHEREx_LinesRB_toast (1365 tiles)
//! ```
//!
//! ## Publishing
//!
//! ```text
//! Moved ./SPHEREx_LinesRB_toast → ../../public/SPHEREx_LinesRB_toast
//! ```
//!
//! ## Summary
//!
//! ```text
//! 2 of 2 images toasted, 2 published
//! ```

use crate::imaging::total_tiles;
use crate::pipeline::{PipelineEvent, PipelineReport};
use std::path::Path;

/// Indentation for context lines under an image header.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// File name of a path, falling back to the whole path.
fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Format a single pipeline progress event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::ImageStarted {
            index,
            total,
            input,
        } => vec![format!("[{}/{}] {}", index, total, file_label(input))],
        PipelineEvent::ImageLoaded {
            width,
            height,
            channels,
            depth,
        } => vec![format!(
            "{}Source: {}\u{00d7}{}, {} channels \u{2192} depth {}",
            indent(1),
            width,
            height,
            channels,
            depth
        )],
        PipelineEvent::LevelWritten { level, tiles } => {
            let noun = if *tiles == 1 { "tile" } else { "tiles" };
            vec![format!("{}Level {}: {} {}", indent(1), level, tiles, noun)]
        }
        PipelineEvent::ManifestRewritten { base_url, rewriter } => vec![format!(
            "{}Rewrote WTML URLs with base: {} ({})",
            indent(1),
            base_url,
            rewriter
        )],
        PipelineEvent::ImageToasted {
            input,
            output_dir,
            tiles,
        } => vec![format!(
            "{}Toasted {} \u{2192} {} ({} tiles)",
            indent(1),
            file_label(input),
            output_dir.display(),
            tiles
        )],
        PipelineEvent::ImageFailed { input, error } => {
            vec![format!("{}Failed {}: {}", indent(1), file_label(input), error)]
        }
        PipelineEvent::Published { from, to } => {
            vec![format!("Moved {} \u{2192} {}", from.display(), to.display())]
        }
    }
}

/// Format the end-of-run summary.
pub fn format_report(report: &PipelineReport) -> Vec<String> {
    let total = report.images.len();
    let toasted = report.images.iter().filter(|i| i.tiles.is_some()).count();
    let published = report
        .images
        .iter()
        .filter(|i| i.published.is_some())
        .count();

    let mut lines = vec![format!(
        "{} of {} images toasted, {} published",
        toasted, total, published
    )];
    for image in report.images.iter().filter(|i| !i.succeeded()) {
        lines.push(format!(
            "{}{}: {}",
            indent(1),
            file_label(&image.input),
            image.error.as_deref().unwrap_or_default()
        ));
    }
    lines
}

/// Print the end-of-run summary to stdout.
pub fn print_report(report: &PipelineReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

/// Format the result of the `depth` command.
pub fn format_depth(longest_edge: u32, tile_size: u32, depth: u32) -> Vec<String> {
    let edge = u64::from(tile_size) << depth;
    vec![
        depth.to_string(),
        format!(
            "{}{} px at tile size {} \u{2192} depth {} ({} px at the deepest level, {} tiles)",
            indent(1),
            longest_edge,
            tile_size,
            depth,
            edge,
            total_tiles(depth)
        ),
    ]
}
