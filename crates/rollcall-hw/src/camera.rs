//! V4L2 capture device used as the live video source.

use crate::frame::{self, Frame, PixelLayout};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Resolution asked of the driver; it may settle on something else.
pub const DEFAULT_SIZE: (u32, u32) = (640, 480);

const STREAM_BUFFERS: u32 = 4;
const DARK_THRESHOLD: f32 = 0.95;
const MAX_DEVICE_INDEX: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no capture device at {0}")]
    NotFound(String),
    #[error("{0} is in use by another process")]
    Busy(String),
    #[error("{0} cannot capture video")]
    NotACaptureDevice(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("capture failed: {0}")]
    Capture(String),
}

impl CameraError {
    fn capture(what: &str, e: impl std::fmt::Display) -> Self {
        CameraError::Capture(format!("{what}: {e}"))
    }
}

/// A capture device found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel formats a snapshot can be produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUYV 4:2:2, converted to RGB.
    Yuyv,
    /// Motion-JPEG; each buffer already is a JPEG still.
    Mjpg,
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpg),
            b"GREY" => Some(PixelFormat::Grey),
            _ => None,
        }
    }
}

pub struct Camera {
    device: Device,
    path: String,
    pub width: u32,
    pub height: u32,
    format: PixelFormat,
}

impl Camera {
    /// Open `path` (e.g. "/dev/video0") at [`DEFAULT_SIZE`].
    pub fn open(path: &str) -> Result<Self, CameraError> {
        Self::open_with_size(path, DEFAULT_SIZE)
    }

    pub fn open_with_size(path: &str, size: (u32, u32)) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::NotFound(path.to_string()));
        }
        let device = Device::with_path(path).map_err(|e| open_error(path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::capture("query capabilities", e))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotACaptureDevice(path.to_string()));
        }
        tracing::info!(device = path, driver = %caps.driver, card = %caps.card, "opened camera");

        let (width, height, format) = negotiate(&device, size)?;
        tracing::info!(width, height, format = ?format, "negotiated capture format");

        Ok(Self {
            device,
            path: path.to_string(),
            width,
            height,
            format,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Grab the next frame from a fresh stream.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = self.stream()?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::capture("dequeue buffer", e))?;
        self.decode(buf, meta.sequence)
    }

    /// Capture and drop `count` frames so auto-exposure can settle.
    pub fn discard_frames(&self, count: usize) -> Result<usize, CameraError> {
        if count == 0 {
            return Ok(0);
        }
        let mut stream = self.stream()?;
        for _ in 0..count {
            stream
                .next()
                .map_err(|e| CameraError::capture("dequeue buffer", e))?;
        }
        tracing::debug!(count, device = %self.path, "discarded warmup frames");
        Ok(count)
    }

    fn stream(&self) -> Result<MmapStream<'_>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::capture("create mmap stream", e))
    }

    fn decode(&self, buf: &[u8], sequence: u32) -> Result<Frame, CameraError> {
        let convert = |e: frame::FrameError| CameraError::capture("convert frame", e);
        let (data, layout, is_dark) = match self.format {
            PixelFormat::Yuyv => {
                let luma = frame::yuyv_to_grayscale(buf, self.width, self.height).map_err(convert)?;
                let rgb = frame::yuyv_to_rgb(buf, self.width, self.height).map_err(convert)?;
                (rgb, PixelLayout::Rgb8, frame::is_dark_frame(&luma, DARK_THRESHOLD))
            }
            PixelFormat::Grey => {
                let pixels = (self.width * self.height) as usize;
                let Some(luma) = buf.get(..pixels) else {
                    return Err(CameraError::Capture(format!(
                        "short GREY buffer: {} of {pixels} bytes",
                        buf.len()
                    )));
                };
                let is_dark = frame::is_dark_frame(luma, DARK_THRESHOLD);
                (luma.to_vec(), PixelLayout::Luma8, is_dark)
            }
            // Brightness is unknown without decoding; let the face service judge it.
            PixelFormat::Mjpg if buf.is_empty() => {
                return Err(CameraError::Capture("empty MJPG buffer".into()))
            }
            PixelFormat::Mjpg => (buf.to_vec(), PixelLayout::Jpeg, false),
        };

        Ok(Frame {
            data,
            layout,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        })
    }

    /// Capture-capable devices among /dev/video0../dev/video15.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_DEVICE_INDEX)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// Ask for YUYV at `size`; webcams that only stream compressed video answer MJPG.
fn negotiate(device: &Device, size: (u32, u32)) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut wanted = device
        .format()
        .map_err(|e| CameraError::Format(format!("read current format: {e}")))?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = size.0;
    wanted.height = size.1;

    let got = device
        .set_format(&wanted)
        .map_err(|e| CameraError::Format(format!("set format: {e}")))?;
    let format = PixelFormat::from_fourcc(got.fourcc).ok_or_else(|| {
        CameraError::Format(format!("unsupported pixel format {} (need YUYV, MJPG or GREY)", got.fourcc))
    })?;
    Ok((got.width, got.height, format))
}

fn open_error(path: &str, e: io::Error) -> CameraError {
    if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
        CameraError::Busy(path.to_string())
    } else {
        CameraError::NotFound(format!("{path}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"H264")), None);
    }

    #[test]
    fn test_missing_device_is_not_found() {
        let err = Camera::open("/dev/rollcall-no-such-camera").err().unwrap();
        assert!(matches!(err, CameraError::NotFound(_)));
    }
}
