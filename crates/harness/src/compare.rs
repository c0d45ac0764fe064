//! Image set comparison against a recorded baseline

use image::{GenericImageView, Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::HarnessResult;

/// Compares a directory of rendered images with a baseline directory
pub trait ImageComparator: Send + Sync {
    fn compare(
        &self,
        rendered_dir: &Path,
        expected_dir: &Path,
        tolerance: f64,
    ) -> HarnessResult<ComparisonReport>;
}

/// Outcome for one image name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageStatus {
    /// Byte-identical to the baseline
    Identical,
    /// Within tolerance
    Match { diff: f64 },
    /// Beyond tolerance
    Differs { diff: f64 },
    DimensionMismatch {
        rendered: (u32, u32),
        expected: (u32, u32),
    },
    /// In the baseline but not rendered
    Missing,
    /// Rendered but not in the baseline
    Unexpected,
    /// Either side failed to decode
    Unreadable { reason: String },
}

impl ImageStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ImageStatus::Identical | ImageStatus::Match { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDiff {
    pub name: String,

    #[serde(flatten)]
    pub status: ImageStatus,

    /// Highlight image written for differing renders
    pub diff_image_path: Option<PathBuf>,
}

impl ImageDiff {
    /// One-line description of a failing image
    pub fn describe(&self, tolerance: f64) -> String {
        match &self.status {
            ImageStatus::Identical => format!("{} identical", self.name),
            ImageStatus::Match { diff } => format!("{} matches ({:.6})", self.name, diff),
            ImageStatus::Differs { diff } => format!(
                "{} differs by {:.6} (tolerance {:.6})",
                self.name, diff, tolerance
            ),
            ImageStatus::DimensionMismatch { rendered, expected } => format!(
                "{} is {}x{}, expected {}x{}",
                self.name, rendered.0, rendered.1, expected.0, expected.1
            ),
            ImageStatus::Missing => format!("{} was not rendered", self.name),
            ImageStatus::Unexpected => format!("{} has no baseline", self.name),
            ImageStatus::Unreadable { reason } => format!("{} could not be decoded: {}", self.name, reason),
        }
    }
}

/// Per-image results of one comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub tolerance: f64,
    pub images: Vec<ImageDiff>,
}

impl ComparisonReport {
    pub fn passed(&self) -> bool {
        self.images.iter().all(|image| !image.status.is_failure())
    }

    pub fn failures(&self) -> Vec<String> {
        self.images
            .iter()
            .filter(|image| image.status.is_failure())
            .map(|image| image.describe(self.tolerance))
            .collect()
    }
}

/// Pixel comparison backed by the `image` crate
#[derive(Debug, Clone)]
pub struct PixelComparator {
    extension: String,

    /// Where highlight images go; `None` disables them
    diff_dir: Option<PathBuf>,
}

impl PixelComparator {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            diff_dir: None,
        }
    }

    pub fn with_diff_dir(mut self, diff_dir: impl Into<PathBuf>) -> Self {
        self.diff_dir = Some(diff_dir.into());
        self
    }

    fn image_names(&self, dir: &Path) -> HarnessResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path.is_file()
                && path
                    .extension()
                    .map(|e| e.to_string_lossy() == self.extension.as_str())
                    .unwrap_or(false);
            if matches {
                if let Some(name) = path.file_name() {
                    names.insert(name.to_string_lossy().to_string());
                }
            }
        }
        Ok(names)
    }

    fn compare_image(
        &self,
        name: &str,
        rendered_path: &Path,
        expected_path: &Path,
        tolerance: f64,
        diff_dir: Option<&Path>,
    ) -> HarnessResult<ImageDiff> {
        // Quick hash comparison
        if hash_file(rendered_path)? == hash_file(expected_path)? {
            debug!("{} matches exactly (same hash)", name);
            return Ok(ImageDiff {
                name: name.to_string(),
                status: ImageStatus::Identical,
                diff_image_path: None,
            });
        }

        let (rendered, expected) = match (image::open(rendered_path), image::open(expected_path)) {
            (Ok(rendered), Ok(expected)) => (rendered, expected),
            (Err(e), _) | (_, Err(e)) => {
                warn!("{} could not be decoded: {}", name, e);
                return Ok(ImageDiff {
                    name: name.to_string(),
                    status: ImageStatus::Unreadable { reason: e.to_string() },
                    diff_image_path: None,
                });
            }
        };

        if rendered.dimensions() != expected.dimensions() {
            warn!(
                "{} dimensions differ: rendered {:?} vs expected {:?}",
                name,
                rendered.dimensions(),
                expected.dimensions()
            );
            return Ok(ImageDiff {
                name: name.to_string(),
                status: ImageStatus::DimensionMismatch {
                    rendered: rendered.dimensions(),
                    expected: expected.dimensions(),
                },
                diff_image_path: None,
            });
        }

        let (width, height) = rendered.dimensions();
        let rendered_rgba = rendered.to_rgba8();
        let expected_rgba = expected.to_rgba8();

        let mut highlight = RgbaImage::new(width, height);
        let mut total = 0u64;

        for (x, y, rendered_pixel) in rendered_rgba.enumerate_pixels() {
            let expected_pixel = expected_rgba.get_pixel(x, y);
            let pixel_diff: u64 = rendered_pixel
                .channels()
                .iter()
                .zip(expected_pixel.channels())
                .map(|(a, b)| (*a as i32 - *b as i32).unsigned_abs() as u64)
                .sum();
            total += pixel_diff;

            if pixel_diff > 0 {
                highlight.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            } else {
                // Keep original but dim it
                let c = rendered_pixel.channels();
                highlight.put_pixel(x, y, image::Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
            }
        }

        let samples = (width as u64) * (height as u64) * 4;
        let diff = if samples == 0 {
            0.0
        } else {
            total as f64 / (samples as f64 * 255.0)
        };

        if diff <= tolerance {
            return Ok(ImageDiff {
                name: name.to_string(),
                status: ImageStatus::Match { diff },
                diff_image_path: None,
            });
        }

        warn!(
            "Visual regression in '{}': difference {:.6} exceeds tolerance {:.6}",
            name, diff, tolerance
        );

        let diff_image_path = match diff_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(name);
                highlight.save(&path)?;
                Some(path)
            }
            None => None,
        };

        Ok(ImageDiff {
            name: name.to_string(),
            status: ImageStatus::Differs { diff },
            diff_image_path,
        })
    }
}

impl ImageComparator for PixelComparator {
    fn compare(
        &self,
        rendered_dir: &Path,
        expected_dir: &Path,
        tolerance: f64,
    ) -> HarnessResult<ComparisonReport> {
        let expected = self.image_names(expected_dir)?;
        let rendered = self.image_names(rendered_dir)?;

        // Highlights are grouped by baseline directory name, i.e. the document
        let diff_dir = match (&self.diff_dir, expected_dir.file_name()) {
            (Some(root), Some(doc)) => Some(root.join(doc)),
            (Some(root), None) => Some(root.clone()),
            (None, _) => None,
        };

        let mut images = Vec::new();
        for name in expected.union(&rendered) {
            let diff = match (rendered.contains(name), expected.contains(name)) {
                (true, true) => self.compare_image(
                    name,
                    &rendered_dir.join(name),
                    &expected_dir.join(name),
                    tolerance,
                    diff_dir.as_deref(),
                )?,
                (false, _) => ImageDiff {
                    name: name.clone(),
                    status: ImageStatus::Missing,
                    diff_image_path: None,
                },
                (true, false) => ImageDiff {
                    name: name.clone(),
                    status: ImageStatus::Unexpected,
                    diff_image_path: None,
                },
            };
            images.push(diff);
        }

        Ok(ComparisonReport { tolerance, images })
    }
}

/// Hash a file using SHA256
pub fn hash_file(path: &Path) -> HarnessResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(path: &Path, width: u32, height: u32, color: [u8; 4]) {
        RgbaImage::from_pixel(width, height, Rgba(color)).save(path).unwrap();
    }

    struct Dirs {
        _root: tempfile::TempDir,
        rendered: PathBuf,
        expected: PathBuf,
        diffs: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = tempfile::tempdir().unwrap();
        let rendered = root.path().join("work");
        let expected = root.path().join("expected").join("doc_a");
        let diffs = root.path().join("diffs");
        std::fs::create_dir_all(&rendered).unwrap();
        std::fs::create_dir_all(&expected).unwrap();
        Dirs {
            _root: root,
            rendered,
            expected,
            diffs,
        }
    }

    #[test]
    fn test_identical_images_pass() {
        let d = dirs();
        solid(&d.rendered.join("a.png"), 4, 4, [10, 20, 30, 255]);
        solid(&d.expected.join("a.png"), 4, 4, [10, 20, 30, 255]);

        let report = PixelComparator::new("png").compare(&d.rendered, &d.expected, 1e-4).unwrap();
        assert!(report.passed());
        assert_eq!(report.images[0].status, ImageStatus::Identical);
    }

    #[test]
    fn test_difference_against_tolerance() {
        let d = dirs();
        // One channel of one pixel off by 255: 255 / (16 * 4 * 255) = 1/64
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        solid(&d.expected.join("a.png"), 4, 4, [0, 0, 0, 255]);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.save(d.rendered.join("a.png")).unwrap();

        let comparator = PixelComparator::new("png").with_diff_dir(&d.diffs);

        let loose = comparator.compare(&d.rendered, &d.expected, 0.02).unwrap();
        assert!(loose.passed());
        assert_eq!(loose.images[0].status, ImageStatus::Match { diff: 1.0 / 64.0 });

        let strict = comparator.compare(&d.rendered, &d.expected, 1e-4).unwrap();
        assert!(!strict.passed());
        assert_eq!(strict.images[0].status, ImageStatus::Differs { diff: 1.0 / 64.0 });
        let highlight = strict.images[0].diff_image_path.clone().unwrap();
        assert_eq!(highlight, d.diffs.join("doc_a").join("a.png"));
        assert!(highlight.exists());
        assert!(strict.failures()[0].contains("a.png differs"));
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let d = dirs();
        solid(&d.rendered.join("a.png"), 4, 4, [0, 0, 0, 255]);
        solid(&d.expected.join("a.png"), 8, 4, [0, 0, 0, 255]);

        let report = PixelComparator::new("png").compare(&d.rendered, &d.expected, 1.0).unwrap();
        assert!(!report.passed());
        assert!(matches!(report.images[0].status, ImageStatus::DimensionMismatch { .. }));
    }

    #[test]
    fn test_missing_and_unexpected_images_fail() {
        let d = dirs();
        solid(&d.expected.join("a.png"), 2, 2, [0, 0, 0, 255]);
        solid(&d.rendered.join("b.png"), 2, 2, [0, 0, 0, 255]);
        std::fs::write(d.rendered.join("a.py"), "not an image").unwrap();

        let report = PixelComparator::new("png").compare(&d.rendered, &d.expected, 1.0).unwrap();
        let statuses: Vec<_> = report.images.iter().map(|i| (i.name.as_str(), &i.status)).collect();
        assert_eq!(
            statuses,
            vec![("a.png", &ImageStatus::Missing), ("b.png", &ImageStatus::Unexpected)]
        );
        assert_eq!(report.failures().len(), 2);
    }

    #[test]
    fn test_undecodable_render_is_a_failed_image() {
        let d = dirs();
        solid(&d.expected.join("a.png"), 4, 4, [0, 0, 0, 255]);
        std::fs::write(d.rendered.join("a.png"), b"truncated render").unwrap();

        let report = PixelComparator::new("png").compare(&d.rendered, &d.expected, 1.0).unwrap();
        assert!(!report.passed());
        assert!(matches!(report.images[0].status, ImageStatus::Unreadable { .. }));
        assert!(report.failures()[0].starts_with("a.png could not be decoded"));
    }
}
