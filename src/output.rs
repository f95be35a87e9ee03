//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Images in photos/ (3)
//! 001 2024/harbour.png
//!     Type: image/png
//! 002 beach.jpg
//!     Type: image/jpeg
//! 003 dunes.jpeg
//!     Type: image/jpeg
//! ```
//!
//! ## Warm
//!
//! ```text
//! 001 beach.jpg
//!     400xauto fit: 48213 bytes
//!     200x200 fill: 9120 bytes
//! 002 dunes.jpeg
//!     400xauto fit: failed (Failed to read image: ...)
//!
//! Warmed 3 renditions, 1 failed
//! ```
//!
//! ## Stats
//!
//! ```text
//! Images: 3
//! Cache: 4 cached, 2 rendered (6 total)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::imaging::{TransformParams, mime_type};
use crate::service::{ServiceStats, WarmOutcome};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `400x300`, with `auto` for a dimension derived from the aspect ratio.
fn format_size(params: &TransformParams) -> String {
    let edge = |v: u32| {
        if v == 0 {
            "auto".to_string()
        } else {
            v.to_string()
        }
    };
    format!("{}x{}", edge(params.width), edge(params.height))
}

// ============================================================================
// Check
// ============================================================================

/// Inventory of a store: every key with its detected type.
pub fn format_inventory(root: &Path, keys: &[String]) -> Vec<String> {
    let mut lines = vec![format!("Images in {}/ ({})", root.display(), keys.len())];
    for (i, key) in keys.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), key));
        if let Some(mime) = mime_type(key) {
            lines.push(format!("{}Type: {}", indent(1), mime));
        }
    }
    lines
}

pub fn print_inventory(root: &Path, keys: &[String]) {
    for line in format_inventory(root, keys) {
        println!("{}", line);
    }
}

// ============================================================================
// Warm
// ============================================================================

/// Outcomes grouped by key, in the order given, followed by a summary line.
pub fn format_warm_summary(outcomes: &[WarmOutcome]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<&str> = None;
    let mut index = 0;

    for outcome in outcomes {
        if current != Some(outcome.key.as_str()) {
            index += 1;
            current = Some(outcome.key.as_str());
            lines.push(format!("{} {}", format_index(index), outcome.key));
        }
        let label = format!(
            "{} {}",
            format_size(&outcome.params),
            outcome.params.resize_mode
        );
        let status = match &outcome.result {
            Ok(bytes) => format!("{} bytes", bytes),
            Err(e) => format!("failed ({})", e),
        };
        lines.push(format!("{}{}: {}", indent(1), label, status));
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    let warmed = outcomes.len() - failed;
    if !lines.is_empty() {
        lines.push(String::new());
    }
    if failed > 0 {
        lines.push(format!("Warmed {} renditions, {} failed", warmed, failed));
    } else {
        lines.push(format!("Warmed {} renditions", warmed));
    }
    lines
}

pub fn print_warm_summary(outcomes: &[WarmOutcome]) {
    for line in format_warm_summary(outcomes) {
        println!("{}", line);
    }
}

// ============================================================================
// Stats
// ============================================================================

pub fn format_stats(stats: &ServiceStats) -> Vec<String> {
    let cache = match &stats.cache {
        Some(cache) => cache.to_string(),
        None => "disabled".to_string(),
    };
    vec![format!("Images: {}", stats.images), format!("Cache: {}", cache)]
}

pub fn print_stats(stats: &ServiceStats) {
    for line in format_stats(stats) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::imaging::ResizeMode;
    use crate::service::ServeError;

    #[test]
    fn inventory_lists_keys_with_types() {
        let keys = vec!["a.jpg".to_string(), "sub/b.png".to_string()];
        let lines = format_inventory(Path::new("photos"), &keys);
        assert_eq!(
            lines,
            vec![
                "Images in photos/ (2)",
                "001 a.jpg",
                "    Type: image/jpeg",
                "002 sub/b.png",
                "    Type: image/png",
            ]
        );
    }

    #[test]
    fn inventory_of_empty_store() {
        let lines = format_inventory(Path::new("photos"), &[]);
        assert_eq!(lines, vec!["Images in photos/ (0)"]);
    }

    fn outcome(
        key: &str,
        width: u32,
        height: u32,
        result: Result<usize, ServeError>,
    ) -> WarmOutcome {
        WarmOutcome {
            key: key.to_string(),
            params: TransformParams::new(width, height).with_resize_mode(ResizeMode::Fill),
            result,
        }
    }

    #[test]
    fn warm_summary_groups_by_key() {
        let outcomes = vec![
            outcome("a.jpg", 400, 0, Ok(1200)),
            outcome("a.jpg", 200, 200, Ok(800)),
            outcome("b.jpg", 400, 0, Err(ServeError::NoImagesAvailable)),
        ];
        let lines = format_warm_summary(&outcomes);
        assert_eq!(
            lines,
            vec![
                "001 a.jpg",
                "    400xauto fill: 1200 bytes",
                "    200x200 fill: 800 bytes",
                "002 b.jpg",
                "    400xauto fill: failed (No images available)",
                "",
                "Warmed 2 renditions, 1 failed",
            ]
        );
    }

    #[test]
    fn warm_summary_with_nothing_to_do() {
        assert_eq!(format_warm_summary(&[]), vec!["Warmed 0 renditions"]);
    }

    #[test]
    fn stats_with_and_without_cache() {
        let disabled = ServiceStats {
            images: 3,
            cache: None,
        };
        assert_eq!(format_stats(&disabled), vec!["Images: 3", "Cache: disabled"]);

        let enabled = ServiceStats {
            images: 3,
            cache: Some(CacheStats {
                hits: 4,
                misses: 2,
                write_failures: 0,
            }),
        };
        assert_eq!(
            format_stats(&enabled)[1],
            "Cache: 4 cached, 2 rendered (6 total)"
        );
    }
}
