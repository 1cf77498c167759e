use crate::Result;
use image::RgbaImage;
use std::sync::Arc;

/// A fully decoded tile image, cheap to clone
#[derive(Debug, Clone)]
pub struct TileBitmap {
    image: Arc<RgbaImage>,
}

impl TileBitmap {
    /// Decode encoded tile bytes (JPEG/PNG/WebP) into an RGBA bitmap
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from_rgba(decoded.to_rgba8()))
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Solid-colour bitmap, handy for placeholders and tests
    pub fn solid(width: u32, height: u32, color: image::Rgba<u8>) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(width.max(1), height.max(1), color))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Decoded size in bytes, used for the cache byte budget
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba};
    use std::io::Cursor;

    #[test]
    fn test_decode_png_roundtrip_dimensions() {
        let source = RgbaImage::from_pixel(32, 16, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();

        let bitmap = TileBitmap::decode(&bytes).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (32, 16));
        assert_eq!(bitmap.byte_size(), 32 * 16 * 4);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(TileBitmap::decode(&[1, 2, 3, 4]).is_err());
    }
}
