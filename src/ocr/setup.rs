use anyhow::{Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::config::TesseractProfile;
use crate::paths::{get_exe_dir, get_tessdata_dir};

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];
#[cfg(not(windows))]
const COMMON_PATHS: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

/// Finds the Tesseract executable: the profile override, then a copy
/// bundled under `<exe_dir>/tesseract/`, then PATH, then common install
/// locations.
pub fn locate_tesseract(profile: &TesseractProfile) -> Result<PathBuf> {
    if let Some(exe) = &profile.executable {
        if exe.exists() {
            return Ok(exe.clone());
        }
        return Err(anyhow!(
            "Configured Tesseract executable not found: {}",
            exe.display()
        ));
    }

    let local_exe = get_exe_dir().join("tesseract").join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for path in COMMON_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR, add it to PATH, or set \
         recognition.<profile>.executable in config.json."
    ))
}

fn has_languages(dir: &Path, language: &str) -> bool {
    language
        .split('+')
        .all(|lang| dir.join(format!("{}.traineddata", lang)).exists())
}

/// Finds a tessdata directory holding every language of the profile.
/// `None` lets Tesseract use its built-in default.
pub fn find_tessdata_dir(profile: &TesseractProfile) -> Option<PathBuf> {
    if let Some(dir) = &profile.tessdata {
        return Some(dir.clone());
    }

    let local = get_tessdata_dir();
    if has_languages(&local, &profile.language) {
        return Some(local);
    }

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_languages(&p, &profile.language) {
            return Some(p);
        }
        let p = p.join("tessdata");
        if has_languages(&p, &profile.language) {
            return Some(p);
        }
    }

    debug!(
        "No tessdata directory with `{}` found, using Tesseract default",
        profile.language
    );
    None
}

/// Downloads any missing traineddata for `language` (e.g. `chi_sim+eng`)
/// into the local tessdata directory and returns that directory.
pub fn ensure_traineddata(language: &str) -> Result<PathBuf> {
    let tessdata_dir = get_tessdata_dir();
    fs::create_dir_all(&tessdata_dir)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    for lang in language.split('+').filter(|l| !l.is_empty()) {
        let path = tessdata_dir.join(format!("{}.traineddata", lang));
        if path.exists() {
            info!("{}.traineddata already present", lang);
            continue;
        }

        let url = format!("{}/{}.traineddata", TESSDATA_REPO, lang);
        info!("Downloading {}...", url);

        let response = client
            .get(&url)
            .header("User-Agent", "deckscan")
            .send()?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to download {}.traineddata: HTTP {}",
                lang,
                response.status()
            ));
        }

        let bytes = response.bytes()?;
        let mut file = fs::File::create(&path)?;
        file.write_all(&bytes)?;

        info!("Downloaded {}.traineddata ({} bytes)", lang, bytes.len());
    }

    Ok(tessdata_dir)
}
