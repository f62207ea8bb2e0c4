use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

/// Anything that can turn a binarized crop into best-effort text.
pub trait OcrEngine: Send {
    fn recognize(&self, img: &GrayImage) -> Result<String>;
}

/// Runs the Tesseract CLI on each crop, restricted to digits.
pub struct TesseractEngine {
    executable: PathBuf,
    psm: u8,
}

impl TesseractEngine {
    pub fn new(executable: PathBuf, psm: u8) -> Self {
        Self { executable, psm }
    }

    /// Asks the executable for its version; confirms it actually runs.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        // Tesseract 4 prints its version on stderr, 5 on stdout
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };

        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, img: &GrayImage) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        let output = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg("stdout")
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("-c")
            .arg("tessedit_char_whitelist=0123456789")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        Ok(parse_stdout(&output.stdout))
    }
}

/// Tesseract ends its text with a newline and a form feed; keep the first
/// non-empty line only.
fn parse_stdout(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == '\u{c}'))
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stdout_strips_trailer() {
        assert_eq!(parse_stdout(b"4200\n\x0c"), "4200");
    }

    #[test]
    fn test_parse_stdout_skips_blank_lines() {
        assert_eq!(parse_stdout(b"\n  \n 350 \n"), "350");
    }

    #[test]
    fn test_parse_stdout_empty() {
        assert_eq!(parse_stdout(b"\x0c"), "");
    }

    #[test]
    fn test_missing_executable_is_error() {
        let engine = TesseractEngine::new(PathBuf::from("/nonexistent/tesseract-bin"), 6);
        let img = GrayImage::new(4, 4);
        assert!(engine.recognize(&img).is_err());
        assert!(engine.version().is_err());
    }
}
