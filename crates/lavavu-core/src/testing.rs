//! Image regression tests
//!
//! Output images are compared against expected images by the backend's
//! image diff. Results are printed as coloured PASS/FAIL lines for
//! whoever runs the test script, and traced.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backend::ImageFormat;
use crate::bridge::RenderMethod;
use crate::error::{LavaVuResult, SessionError};
use crate::session::{data_url, SessionCore};

/// Default allowed difference
pub const TOLERANCE: f32 = 0.0001;

const RED: &str = "\x1b[91m";
const GREEN: &str = "\x1b[92m";
const RESET: &str = "\x1b[0m";

/// PNG and JPEG files in `dir`, by name
fn images_in(dir: &Path) -> LavaVuResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"));
        if image && path.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

impl SessionCore {
    /// Compare one output image with its expected image
    ///
    /// Passes when the difference is within `tolerance`. A missing expected
    /// image skips the comparison and counts as a pass.
    pub fn testimage(&self, expected: &Path, output: &Path, tolerance: f32) -> LavaVuResult<bool> {
        if !expected.exists() {
            println!("Test skipped, reference image '{}' not found!", expected.display());
            warn!(expected = %expected.display(), "reference image missing, skipped");
            return Ok(true);
        }
        if !output.exists() {
            return Err(SessionError::ImageMissing {
                path: output.to_path_buf(),
            }
            .into());
        }
        let (a, b) = (output.to_path_buf(), expected.to_path_buf());
        let diff = self.routed(RenderMethod::ImageDiff, move |backend| {
            backend.image_diff(&a, &b)
        })??;
        let passed = diff <= tolerance;
        if passed {
            println!(
                "{}PASS{}: {} Image comp errors {:.6}, within tolerance {} of ref image.",
                GREEN,
                RESET,
                output.display(),
                diff,
                tolerance
            );
            info!(output = %output.display(), diff, "image test passed");
        } else {
            println!(
                "{}FAIL{}: {} Image comp errors {:.6}, not within tolerance {} of reference image.",
                RED,
                RESET,
                output.display(),
                diff,
                tolerance
            );
            warn!(output = %output.display(), diff, tolerance, "image test failed");
            if self.config().echo_fail {
                println!("__________________________________________");
                println!("{}", output.display());
                let bytes = fs::read(output)?;
                println!("{}", data_url(ImageFormat::from_path(output), &bytes));
                println!("__________________________________________");
            }
        }
        Ok(passed)
    }

    /// Compare a batch of images by file name
    ///
    /// With no names, every image in `expected_dir` is tested. When
    /// `expected_dir` does not exist it is created and seeded with the
    /// outputs, so the first run always passes. Fails after the whole batch
    /// if any comparison failed; otherwise `clear` removes the outputs.
    pub fn testimages(
        &self,
        images: &[&str],
        tolerance: f32,
        expected_dir: &Path,
        output_dir: &Path,
        clear: bool,
    ) -> LavaVuResult<()> {
        let mut names: Vec<String> = images.iter().map(|s| s.to_string()).collect();
        if !expected_dir.is_dir() {
            println!("No expected data, copying found images to expected folder...");
            fs::create_dir_all(expected_dir)?;
            if names.is_empty() {
                names = images_in(output_dir)?;
            }
            for name in &names {
                fs::copy(output_dir.join(name), expected_dir.join(name))?;
            }
        }
        if names.is_empty() {
            names = images_in(expected_dir)?;
        }
        names.sort();

        let mut failed = Vec::new();
        for name in &names {
            let output = output_dir.join(name);
            if !self.testimage(&expected_dir.join(name), &output, tolerance)? {
                failed.push(output.display().to_string());
            }
        }
        if !failed.is_empty() {
            return Err(SessionError::ImageTestFailed { failed }.into());
        }
        if clear {
            for name in &names {
                let output: PathBuf = output_dir.join(name);
                if let Err(e) = fs::remove_file(&output) {
                    warn!(path = %output.display(), "could not remove test output: {}", e);
                }
            }
        }
        println!("-------------\nTests Passed!\n-------------");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SessionMode};
    use crate::error::LavaVuError;
    use crate::session::Session;

    fn direct() -> Session {
        Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).unwrap()
    }

    #[test]
    fn test_images_in_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(images_in(dir.path()).unwrap(), vec!["a.JPG", "b.png"]);
    }

    #[test]
    fn test_missing_reference_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let lv = direct();
        let passed = lv
            .testimage(&dir.path().join("none.png"), &dir.path().join("out.png"), TOLERANCE)
            .unwrap();
        assert!(passed);
    }

    #[test]
    fn test_missing_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("exp.png");
        fs::write(&expected, b"x").unwrap();
        let lv = direct();
        let err = lv
            .testimage(&expected, &dir.path().join("out.png"), TOLERANCE)
            .unwrap_err();
        assert!(matches!(err, LavaVuError::Session(SessionError::ImageMissing { .. })));
    }

    #[test]
    fn test_seed_then_compare() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let lv = direct();
        lv.image(Some(&out.join("frame.png")), Some((32, 24)), false).unwrap();

        let expected = dir.path().join("expected");
        lv.testimages(&[], TOLERANCE, &expected, &out, true).unwrap();
        assert!(expected.join("frame.png").exists());
        assert!(!out.join("frame.png").exists());
    }

    #[test]
    fn test_failures_reported_after_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (out, expected) = (dir.path().join("out"), dir.path().join("expected"));
        fs::create_dir(&out).unwrap();
        fs::create_dir(&expected).unwrap();
        let lv = direct();
        lv.image(Some(&expected.join("a.png")), Some((32, 24)), false).unwrap();
        lv.image(Some(&expected.join("b.png")), Some((32, 24)), false).unwrap();
        lv.set("background", "white").unwrap();
        lv.image(Some(&out.join("a.png")), Some((32, 24)), false).unwrap();
        lv.image(Some(&out.join("b.png")), Some((32, 24)), false).unwrap();

        let err = lv.testimages(&[], TOLERANCE, &expected, &out, true).unwrap_err();
        match err {
            LavaVuError::Session(SessionError::ImageTestFailed { failed }) => {
                assert_eq!(failed.len(), 2)
            }
            other => panic!("unexpected {:?}", other),
        }
        // Failing outputs are kept
        assert!(out.join("a.png").exists());
    }
}
