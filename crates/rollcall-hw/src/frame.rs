//! Frame type and pixel conversion: YUYV to RGB, dark detection, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

const DARK_LEVEL: u8 = 32;

/// Memory layout of [`Frame::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 8-bit RGB, 3 bytes per pixel.
    Rgb8,
    /// 8-bit grayscale, 1 byte per pixel.
    Luma8,
    /// Already a complete JPEG bitstream (MJPG cameras).
    Jpeg,
}

/// A captured camera frame.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub layout: PixelLayout,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Encode this frame as JPEG at `quality` (1–100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let color = match self.layout {
            PixelLayout::Jpeg => return Ok(self.data.clone()),
            PixelLayout::Rgb8 => ExtendedColorType::Rgb8,
            PixelLayout::Luma8 => ExtendedColorType::L8,
        };
        let mut out = Vec::with_capacity(self.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(&self.data, self.width, self.height, color)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out)
    }
}

/// Extract the Y channel of packed YUYV (4:2:2): every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let packed = yuyv_payload(yuyv, width, height)?;
    Ok(packed.iter().step_by(2).copied().collect())
}

/// Convert packed YUYV to RGB8 using BT.601 studio-swing coefficients.
///
/// Each 4-byte group `[Y0, U, Y1, V]` yields two pixels sharing U and V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let packed = yuyv_payload(yuyv, width, height)?;
    let mut rgb = Vec::with_capacity(packed.len() / 2 * 3);
    for chunk in packed.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// The `width * height` pixels of a YUYV buffer, ignoring driver padding.
fn yuyv_payload(yuyv: &[u8], width: u32, height: u32) -> Result<&[u8], FrameError> {
    let expected = (width * height * 2) as usize;
    yuyv.get(..expected).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}

/// Returns true if more than `threshold_pct` of pixels are in the darkest bucket (0–31).
///
/// Cameras emit a few black frames while auto-exposure settles.
pub fn is_dark_frame(luma: &[u8], threshold_pct: f32) -> bool {
    if luma.is_empty() {
        return true;
    }
    let dark = luma.iter().filter(|&&p| p < DARK_LEVEL).count();
    dark as f32 / luma.len() as f32 > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, layout: PixelLayout, w: u32, h: u32) -> Frame {
        Frame {
            data,
            layout,
            width: w,
            height: h,
            timestamp: std::time::Instant::now(),
            sequence: 0,
            is_dark: false,
        }
    }

    #[test]
    fn test_yuyv_to_grayscale() {
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_grayscale(&[100, 128], 2, 1).is_err());
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_to_rgb_black_and_white() {
        // Y=16 is black, Y=235 is white in studio swing
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_dominant() {
        // strong V pushes red up and green down
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        assert!(rgb[0] > 200);
        assert!(rgb[1] < 40);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&vec![0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&vec![128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_encode_rgb_produces_jpeg_magic() {
        let f = frame(vec![120u8; 8 * 8 * 3], PixelLayout::Rgb8, 8, 8);
        let jpeg = f.encode_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_encode_luma() {
        let f = frame(vec![60u8; 16 * 16], PixelLayout::Luma8, 16, 16);
        let jpeg = f.encode_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_encode_passes_mjpg_through() {
        let bytes = vec![0xff, 0xd8, 0x01, 0x02];
        let f = frame(bytes.clone(), PixelLayout::Jpeg, 4, 4);
        assert_eq!(f.encode_jpeg(50).unwrap(), bytes);
    }
}
