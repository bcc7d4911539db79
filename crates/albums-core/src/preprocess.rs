//! Image decoding, validation and model-input resizing.
//!
//! Every model capability has a fixed square input contract. Images are
//! first bounded to `pre_resize_dimension` (aspect preserved) so oversized
//! uploads never reach the final resample at full resolution, then
//! stretched to the exact target size.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::io::{BufRead, Cursor, Seek};
use std::path::Path;
use thiserror::Error;

/// Largest accepted side, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 4000;
/// Images with a larger side than this are downscaled before the final resize.
pub const PRE_RESIZE_DIMENSION: u32 = 1024;
/// Input side expected by the face detector.
pub const FACE_INPUT_SIZE: u32 = 800;
/// Input side expected by the image classifier.
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("cannot open image: {0}")]
    Open(#[from] std::io::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image too large: {width}x{height} exceeds {max}px")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("resize failed: {0}")]
    Resize(String),
}

impl PreprocessError {
    /// True for errors that mean the input itself is unusable
    /// (undecodable or oversized), as opposed to a resize failure.
    pub fn is_unsupported_image(&self) -> bool {
        !matches!(self, PreprocessError::Resize(_))
    }
}

/// Size limits applied while preprocessing.
#[derive(Debug, Clone, Copy)]
pub struct PreprocessConfig {
    pub max_dimension: u32,
    pub pre_resize_dimension: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: MAX_IMAGE_DIMENSION,
            pre_resize_dimension: PRE_RESIZE_DIMENSION,
        }
    }
}

/// Decodes, validates and resizes images for the model capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decode the image at `path` into 8-bit RGB.
    ///
    /// Fails if the file cannot be decoded or its larger side exceeds
    /// `max_dimension`. The dimension check reads only the header.
    pub fn validate(&self, path: &Path) -> Result<RgbImage, PreprocessError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        self.decode_checked(reader)
    }

    /// Same as [`validate`](Self::validate) for an in-memory buffer.
    pub fn validate_bytes(&self, bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        self.decode_checked(reader)
    }

    fn decode_checked<R: BufRead + Seek>(
        &self,
        reader: ImageReader<R>,
    ) -> Result<RgbImage, PreprocessError> {
        let decoder = reader.into_decoder()?;
        let (width, height) = decoder.dimensions();
        if width.max(height) > self.config.max_dimension {
            tracing::warn!(width, height, max = self.config.max_dimension, "image too large");
            return Err(PreprocessError::TooLarge {
                width,
                height,
                max: self.config.max_dimension,
            });
        }

        let image = DynamicImage::from_decoder(decoder)?;
        // Gray, RGBA, 16-bit → 8-bit RGB
        Ok(image.into_rgb8())
    }

    /// Resize `image` to exactly `target × target` pixels.
    ///
    /// Two stages: bound the larger side to `pre_resize_dimension` keeping
    /// the aspect ratio, then stretch to the square target.
    pub fn resize_for(&self, image: &RgbImage, target: u32) -> Result<RgbImage, PreprocessError> {
        let (width, height) = image.dimensions();
        if target == 0 {
            return Err(PreprocessError::Resize("target size is zero".into()));
        }
        if width == 0 || height == 0 {
            return Err(PreprocessError::Resize(format!(
                "source image is empty ({width}x{height})"
            )));
        }

        let bound = self.config.pre_resize_dimension;
        let longest = width.max(height);
        let pre_resized;
        let source = if longest > bound {
            let (new_w, new_h) = scaled_dimensions(width, height, bound);
            tracing::debug!(width, height, new_w, new_h, "pre-resizing oversized image");
            pre_resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
            &pre_resized
        } else {
            image
        };

        Ok(imageops::resize(source, target, target, FilterType::Triangle))
    }
}

/// Scale `(width, height)` so the larger side equals `bound`, keeping aspect.
fn scaled_dimensions(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let scale = bound as f32 / width.max(height) as f32;
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    (new_w, new_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_scaled_dimensions_landscape() {
        assert_eq!(scaled_dimensions(2048, 1024, 1024), (1024, 512));
    }

    #[test]
    fn test_scaled_dimensions_portrait() {
        assert_eq!(scaled_dimensions(1000, 3000, 1024), (341, 1024));
    }

    #[test]
    fn test_scaled_dimensions_never_zero() {
        assert_eq!(scaled_dimensions(4000, 1, 1024), (1024, 1));
    }

    #[test]
    fn test_validate_decodes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 64, 32);
        let img = Preprocessor::default().validate(&path).unwrap();
        assert_eq!(img.dimensions(), (64, 32));
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_validate_converts_grayscale_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(8, 8, image::Luma([77])).save(&path).unwrap();
        let img = Preprocessor::default().validate(&path).unwrap();
        assert_eq!(img.get_pixel(3, 3), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_validate_rejects_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "wide.png", 120, 10);
        let pre = Preprocessor::new(PreprocessConfig {
            max_dimension: 100,
            pre_resize_dimension: 50,
        });
        let err = pre.validate(&path).unwrap_err();
        assert!(matches!(err, PreprocessError::TooLarge { width: 120, height: 10, max: 100 }));
        assert!(err.is_unsupported_image());
    }

    #[test]
    fn test_validate_rejects_corrupt_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let err = Preprocessor::default().validate(&path).unwrap_err();
        assert!(err.is_unsupported_image());
    }

    #[test]
    fn test_validate_missing_file() {
        let err = Preprocessor::default()
            .validate(Path::new("/nonexistent/photo.png"))
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Open(_)));
    }

    #[test]
    fn test_validate_bytes() {
        let mut buf = Vec::new();
        RgbImage::from_pixel(5, 7, Rgb([1, 2, 3]))
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let img = Preprocessor::default().validate_bytes(&buf).unwrap();
        assert_eq!(img.dimensions(), (5, 7));
    }

    #[test]
    fn test_resize_stretches_to_target() {
        let img = RgbImage::from_pixel(300, 100, Rgb([0, 0, 0]));
        let out = Preprocessor::default().resize_for(&img, CLASSIFIER_INPUT_SIZE).unwrap();
        assert_eq!(out.dimensions(), (224, 224));
    }

    #[test]
    fn test_resize_oversized_input() {
        let img = RgbImage::from_pixel(2000, 1500, Rgb([50, 60, 70]));
        let out = Preprocessor::default().resize_for(&img, FACE_INPUT_SIZE).unwrap();
        assert_eq!(out.dimensions(), (800, 800));
        // Uniform input stays uniform through both stages
        assert_eq!(out.get_pixel(400, 400), &Rgb([50, 60, 70]));
    }

    #[test]
    fn test_resize_zero_target_fails() {
        let img = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let err = Preprocessor::default().resize_for(&img, 0).unwrap_err();
        assert!(!err.is_unsupported_image());
    }

    #[test]
    fn test_resize_empty_source_fails() {
        let img = RgbImage::new(0, 0);
        assert!(Preprocessor::default().resize_for(&img, 224).is_err());
    }
}
