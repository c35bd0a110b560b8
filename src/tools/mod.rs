//! Dataset helpers shared by `qrtool reading-rate` and the benches.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::DecodeResult;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Dataset root from `QR_DATASET_ROOT`, else `benches/images`.
pub fn dataset_root_from_env() -> PathBuf {
    env::var("QR_DATASET_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("benches/images"))
}

/// Image limit from `QR_BENCH_LIMIT`. Unset or `0` means the full dataset.
pub fn bench_limit_from_env() -> Option<usize> {
    env::var("QR_BENCH_LIMIT")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

/// Whether `QR_SMOKE` asks for the short image list.
pub fn smoke_from_env() -> bool {
    matches!(
        env::var("QR_SMOKE").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}

/// Sorted image paths under `root`, truncated to `limit`.
///
/// With `smoke` set, paths listed in `root/_smoke.txt` are used instead of a
/// full scan when that file exists and names at least one image.
pub fn dataset_iter<P: AsRef<Path>>(
    root: P,
    limit: Option<usize>,
    smoke: bool,
) -> impl Iterator<Item = PathBuf> {
    let root = root.as_ref();
    let mut images = smoke
        .then(|| load_smoke_list(root))
        .flatten()
        .unwrap_or_else(|| collect_images(root));

    images.sort();
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    images.into_iter()
}

fn load_smoke_list(root: &Path) -> Option<Vec<PathBuf>> {
    let contents = fs::read_to_string(root.join("_smoke.txt")).ok()?;
    let paths: Vec<PathBuf> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let candidate = Path::new(line);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                root.join(candidate)
            }
        })
        .filter(|path| path.exists())
        .collect();
    if paths.is_empty() { None } else { Some(paths) }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Recursively collect image files under `root`. Unreadable directories are skipped.
pub fn collect_images(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut images = Vec::new();

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_image(&path) {
                images.push(path);
            }
        }
    }

    images
}

/// Per-stage hit counts over a dataset run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTally {
    /// Images processed, rejected ones included.
    pub total: usize,
    /// Images that failed the precondition check.
    pub rejected: usize,
    /// Images where the cascade found nothing.
    pub missed: usize,
    /// Successful images per winning stage.
    pub hits: BTreeMap<String, usize>,
}

impl StageTally {
    /// Count one decoded (or not decoded) image.
    pub fn record(&mut self, result: &DecodeResult) {
        self.total += 1;
        match result.stage() {
            Some(stage) if result.found() => *self.hits.entry(stage.to_string()).or_default() += 1,
            _ => self.missed += 1,
        }
    }

    /// Count one image that could not be read.
    pub fn record_rejected(&mut self) {
        self.total += 1;
        self.rejected += 1;
    }

    /// Images decoded by any stage.
    pub fn decoded(&self) -> usize {
        self.hits.values().sum()
    }

    /// Share of processed images that decoded, in percent.
    pub fn reading_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.decoded() as f64 * 100.0 / self.total as f64
        }
    }
}

impl fmt::Display for StageTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "decoded {}/{} ({:.2}%), missed {}, unreadable {}",
            self.decoded(),
            self.total,
            self.reading_rate(),
            self.missed,
            self.rejected
        )?;
        for (stage, count) in &self.hits {
            writeln!(f, "  {stage:<20} {count}")?;
        }
        Ok(())
    }
}
