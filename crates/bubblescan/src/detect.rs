//! Helpers working directly on `image::GrayImage`.

use crate::calibration::{CalibrationError, ManualCalibration};
use crate::engine::{SheetOutcome, SheetReader};
use crate::io::{SheetConfig, SheetError, SheetReport};
use bubblescan_anchors::TextRecognizer;
use bubblescan_core::GrayImageView;
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Borrow an `image::GrayImage` as a [`GrayImageView`].
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Decode any supported image file to 8-bit gray.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, SheetError> {
    Ok(::image::open(path)?.to_luma8())
}

pub fn read_sheet_image(
    reader: &SheetReader,
    img: &::image::GrayImage,
    recognizer: Option<&dyn TextRecognizer>,
    calibration: Option<&ManualCalibration>,
) -> Result<SheetOutcome, CalibrationError> {
    reader.read(&gray_view(img), recognizer, calibration)
}

/// Load everything a config names, read the sheet and build the report.
///
/// A tokens file takes precedence over running `tesseract`.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(image = %config.image_path)))]
pub fn run_config(config: &SheetConfig) -> Result<SheetReport, SheetError> {
    #[cfg(not(feature = "tesseract"))]
    if config.tokens_path.is_none() && config.tesseract.is_some() {
        return Err(SheetError::RecognizerUnavailable("tesseract"));
    }
    let template = config.load_template()?;
    let tokens = config.load_tokens()?;
    let calibration = config.load_calibration()?;
    let img = load_gray(&config.image_path)?;

    let reader = SheetReader::new(template, config.reader_params());

    #[cfg(feature = "tesseract")]
    let tesseract = match (&tokens, &config.tesseract) {
        (None, Some(params)) => Some(crate::ocr::TesseractRecognizer::new(params.clone())),
        _ => None,
    };
    let recognizer: Option<&dyn TextRecognizer> = match &tokens {
        Some(t) => Some(t as &dyn TextRecognizer),
        #[cfg(feature = "tesseract")]
        None => tesseract.as_ref().map(|r| r as &dyn TextRecognizer),
        #[cfg(not(feature = "tesseract"))]
        None => None,
    };
    let outcome = read_sheet_image(&reader, &img, recognizer, calibration.as_ref())?;
    Ok(SheetReport::from_outcome(config, reader.template(), outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_shares_the_buffer() {
        let img = ::image::GrayImage::from_fn(4, 3, |x, y| ::image::Luma([(x + 4 * y) as u8]));
        let view = gray_view(&img);
        assert_eq!((view.width, view.height), (4, 3));
        assert_eq!(view.get(3, 2), 11);
    }

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn tesseract_request_needs_the_feature() {
        let mut config = SheetConfig::new("missing.png", "missing.json");
        config.tesseract = Some(crate::TesseractParams::default());
        assert!(matches!(
            run_config(&config),
            Err(SheetError::RecognizerUnavailable("tesseract"))
        ));
    }
}
