use image::RgbaImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::trace;

use super::setup::{find_tessdata_dir, locate_tesseract};
use super::{Hypothesis, RecognitionMode, Recognizer};
use crate::config::TesseractProfile;
use crate::error::RecognitionError;

const DIGIT_WHITELIST: &str = "tessedit_char_whitelist=0123456789";

/// Recognizer backed by the Tesseract command line tool.
///
/// Each call writes the region to a scratch PNG, runs Tesseract with TSV
/// output and parses per-line confidences. Scratch files live in a
/// per-call temporary directory that is removed on every exit path.
#[derive(Clone, Debug)]
pub struct TesseractRecognizer {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    language: String,
    /// Apply the digit whitelist to every call, not just `Digits` mode
    digits_only: bool,
}

impl TesseractRecognizer {
    pub fn new(executable: PathBuf, tessdata: Option<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            executable,
            tessdata,
            language: language.into(),
            digits_only: false,
        }
    }

    /// Resolves the executable and tessdata for a configured profile.
    pub fn from_profile(profile: &TesseractProfile) -> anyhow::Result<Self> {
        let executable = locate_tesseract(profile)?;
        let tessdata = find_tessdata_dir(profile);
        Ok(Self::new(executable, tessdata, profile.language.clone()))
    }

    /// Restricts every invocation to the digit alphabet.
    pub fn digits_only(mut self) -> Self {
        self.digits_only = true;
        self
    }

    fn build_command(&self, input: &std::path::Path, output_base: &std::path::Path, mode: RecognitionMode) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input).arg(output_base);
        if let Some(tessdata) = &self.tessdata {
            cmd.arg("--tessdata-dir").arg(tessdata);
        }
        cmd.arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(mode.segmentation().psm().to_string());
        if self.digits_only || matches!(mode, RecognitionMode::Digits(_)) {
            cmd.arg("-c").arg(DIGIT_WHITELIST);
        }
        // Output TSV format
        cmd.arg("tsv");
        cmd
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(
        &self,
        region: &RgbaImage,
        mode: RecognitionMode,
    ) -> Result<Vec<Hypothesis>, RecognitionError> {
        if region.width() == 0 || region.height() == 0 {
            return Ok(Vec::new());
        }

        let temp_input = NamedTempFile::with_suffix(".png")?;
        region.save_with_format(temp_input.path(), image::ImageFormat::Png)?;

        // Tesseract appends .tsv to the output base
        let output_dir = tempfile::tempdir()?;
        let output_base = output_dir.path().join("out");

        let output = self
            .build_command(temp_input.path(), &output_base, mode)
            .output()
            .map_err(|e| {
                RecognitionError::Unavailable(format!("{}: {}", self.executable.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Invocation(stderr.trim().to_string()));
        }

        let tsv = std::fs::read_to_string(output_base.with_extension("tsv"))?;
        let lines = parse_tsv_output(&tsv);
        trace!("Tesseract {:?}: {:?}", mode, lines);
        Ok(lines)
    }
}

/// Parses Tesseract TSV output into one hypothesis per text line,
/// in reading order, with the mean word confidence.
pub fn parse_tsv_output(tsv: &str) -> Vec<Hypothesis> {
    let mut lines: Vec<Hypothesis> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<&str> = Vec::new();
    let mut current_conf_sum: f32 = 0.0;

    // Skip header
    for line in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        // Level 5 = word
        if level != 5 {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        if text.is_empty() || conf < 0.0 {
            continue;
        }

        if current_key.is_some() && current_key != Some(key) {
            push_line(&mut lines, &current_words, current_conf_sum);
            current_words.clear();
            current_conf_sum = 0.0;
        }
        current_key = Some(key);
        current_words.push(text);
        current_conf_sum += conf;
    }

    push_line(&mut lines, &current_words, current_conf_sum);
    lines
}

fn push_line(lines: &mut Vec<Hypothesis>, words: &[&str], conf_sum: f32) {
    if !words.is_empty() {
        lines.push(Hypothesis {
            text: words.join(" "),
            confidence: conf_sum / words.len() as f32,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::PageSegmentation;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_groups_lines() {
        let tsv = format!(
            "{}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t100\t50\t-1\t\n\
             5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90.0\t卡莎,\n\
             5\t1\t1\t1\t1\t2\t12\t0\t10\t10\t70.0\t虚空之女\n\
             5\t1\t1\t1\t2\t1\t0\t20\t10\t10\t80.0\tx3\n\
             5\t1\t1\t1\t2\t2\t0\t20\t10\t10\t-1\t\n",
            HEADER
        );

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "卡莎, 虚空之女");
        assert!((lines[0].confidence - 80.0).abs() < 1e-4);
        assert_eq!(lines[1].text, "x3");
    }

    #[test]
    fn test_parse_tsv_separates_blocks_with_same_line_num() {
        let tsv = format!(
            "{}\n\
             5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tA\n\
             5\t1\t2\t1\t1\t1\t0\t40\t10\t10\t50\tB\n",
            HEADER
        );
        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text, "B");
    }

    #[test]
    fn test_parse_tsv_empty() {
        assert!(parse_tsv_output(HEADER).is_empty());
        assert!(parse_tsv_output("").is_empty());
    }

    #[test]
    fn test_digit_mode_adds_whitelist() {
        let rec = TesseractRecognizer::new(PathBuf::from("tesseract"), None, "eng");
        let cmd = rec.build_command(
            std::path::Path::new("in.png"),
            std::path::Path::new("out"),
            RecognitionMode::Digits(PageSegmentation::SingleChar),
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&DIGIT_WHITELIST.to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--psm" && w[1] == "10"));
        assert_eq!(args.last().map(String::as_str), Some("tsv"));

        let cmd = rec.build_command(
            std::path::Path::new("in.png"),
            std::path::Path::new("out"),
            RecognitionMode::Text(PageSegmentation::Block),
        );
        assert!(!cmd.get_args().any(|a| a == DIGIT_WHITELIST));
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let rec = TesseractRecognizer::new(PathBuf::from("/nonexistent/deckscan/tesseract"), None, "eng");
        let img = RgbaImage::new(4, 4);
        let err = rec
            .recognize(&img, RecognitionMode::Text(PageSegmentation::Block))
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Unavailable(_)));
    }
}
