//! Reading codes printed on the first page of a scan.
//!
//! The pipeline only sees the [`PageDecoder`] trait. [`QrPageDecoder`] decodes
//! the first page with `image` and looks for QR codes with `rqrr`;
//! [`NullDecoder`] is used when decoding is switched off.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::DecoderConfig;
use crate::error::{Error, Result};

/// Extracts text codes from the first page of an image file
pub trait PageDecoder {
    /// Every code found on the first page, in detection order
    fn decode_first_page(&self, path: &Path) -> Result<Vec<String>>;
}

impl<D: PageDecoder + ?Sized> PageDecoder for Box<D> {
    fn decode_first_page(&self, path: &Path) -> Result<Vec<String>> {
        (**self).decode_first_page(path)
    }
}

/// Decoder that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDecoder;

impl PageDecoder for NullDecoder {
    fn decode_first_page(&self, _path: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// QR code reader for the first page of a TIFF
#[derive(Debug, Clone)]
pub struct QrPageDecoder {
    license_file: Option<PathBuf>,
}

impl QrPageDecoder {
    /// Build the decoder, checking that any configured licence data is readable
    pub fn new(config: &DecoderConfig) -> Result<Self> {
        if let Some(license) = &config.license_file {
            File::open(license).map_err(|e| {
                Error::Configuration(format!(
                    "Cannot read decoder license file {}: {}",
                    license.display(),
                    e
                ))
            })?;
            info!("Decoder license loaded from {}", license.display());
        }

        Ok(Self {
            license_file: config.license_file.clone(),
        })
    }

    pub fn license_file(&self) -> Option<&Path> {
        self.license_file.as_deref()
    }
}

impl PageDecoder for QrPageDecoder {
    fn decode_first_page(&self, path: &Path) -> Result<Vec<String>> {
        if !path.is_file() {
            return Err(Error::Decode {
                path: path.to_path_buf(),
                reason: "not an existing regular file".to_string(),
            });
        }

        // Multi-page TIFFs decode their first directory only
        let page = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?
            .into_luma8();

        let (width, height) = page.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| page.get_pixel(x as u32, y as u32).0[0],
        );

        let mut codes = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => codes.push(content),
                Err(e) => debug!("Unreadable QR grid in {}: {}", path.display(), e),
            }
        }
        Ok(codes)
    }
}

/// Decoder selected by the configuration
pub fn decoder_from_config(config: &DecoderConfig) -> Result<Box<dyn PageDecoder>> {
    if config.enabled {
        Ok(Box::new(QrPageDecoder::new(config)?))
    } else {
        info!("Page decoding disabled");
        Ok(Box::new(NullDecoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_blank_page_has_no_codes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.tif");
        image::GrayImage::from_pixel(64, 64, image::Luma([255u8]))
            .save_with_format(&path, image::ImageFormat::Tiff)
            .unwrap();

        let decoder = QrPageDecoder::new(&DecoderConfig::default()).unwrap();
        assert!(decoder.decode_first_page(&path).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();

        let decoder = QrPageDecoder::new(&DecoderConfig::default()).unwrap();
        assert!(decoder.decode_first_page(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let decoder = QrPageDecoder::new(&DecoderConfig::default()).unwrap();
        let result = decoder.decode_first_page(Path::new("/path/that/does/not/exist.tif"));
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn test_unreadable_license_is_configuration_error() {
        let config = DecoderConfig {
            enabled: true,
            license_file: Some(PathBuf::from("/path/that/does/not/exist.lic")),
        };
        assert!(matches!(
            QrPageDecoder::new(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_disabled_decoder_finds_nothing() {
        let config = DecoderConfig {
            enabled: false,
            license_file: None,
        };
        let decoder = decoder_from_config(&config).unwrap();
        assert!(decoder
            .decode_first_page(Path::new("/anything.tif"))
            .unwrap()
            .is_empty());
    }
}
