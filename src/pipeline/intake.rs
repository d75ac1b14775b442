//! Payload checks that run before any decoding.

use image::ImageFormat;

use crate::config::IntakeConfig;
use crate::error::ValidationError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Checks size and sniffed format of one image payload.
pub fn validate(bytes: &[u8], cfg: &IntakeConfig) -> Result<ImageFormat, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }

    let size_mb = bytes.len() as f64 / BYTES_PER_MB;
    if size_mb > cfg.max_file_size_mb {
        return Err(ValidationError::TooLarge {
            size_mb,
            max_mb: cfg.max_file_size_mb,
        });
    }

    let accepted = |format: ImageFormat| {
        cfg.accepted_formats
            .iter()
            .any(|f| f.as_image_format() == format)
    };
    match image::guess_format(bytes) {
        Ok(format) if accepted(format) => Ok(format),
        _ => Err(ValidationError::UnsupportedFormat {
            accepted: cfg
                .accepted_formats
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Rejects a whole batch that exceeds the configured item count.
pub fn validate_batch_size(count: usize, cfg: &IntakeConfig) -> Result<(), ValidationError> {
    if count > cfg.max_batch_size {
        return Err(ValidationError::BatchTooLarge {
            max: cfg.max_batch_size,
            received: count,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}
