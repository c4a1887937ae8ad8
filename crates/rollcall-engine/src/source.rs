use rollcall_core::Snapshot;
use rollcall_hw::{Camera, CameraError};

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// A live video source that can hand out a still on demand.
///
/// `snapshot` may block on the device; the sampler calls it from tokio's
/// blocking pool. `Ok(None)` means no usable frame right now; the caller
/// skips the tick.
pub trait FrameSource: Send {
    fn snapshot(&mut self) -> Result<Option<Snapshot>, SourceError>;
}

/// V4L2 camera as a frame source, JPEG-encoding each still.
pub struct CameraSource {
    camera: Camera,
    jpeg_quality: u8,
    sequence: u64,
}

impl CameraSource {
    /// Open the camera and discard `warmup_frames` for auto-exposure to settle.
    pub fn open(device: &str, warmup_frames: usize, jpeg_quality: u8) -> Result<Self, CameraError> {
        let camera = Camera::open(device)?;
        tracing::info!(
            device = camera.path(),
            width = camera.width,
            height = camera.height,
            format = ?camera.pixel_format(),
            "camera source ready"
        );
        if warmup_frames > 0 {
            tracing::info!(count = warmup_frames, "discarding warmup frames");
            camera.discard_frames(warmup_frames)?;
        }
        Ok(Self {
            camera,
            jpeg_quality,
            sequence: 0,
        })
    }
}

impl FrameSource for CameraSource {
    fn snapshot(&mut self) -> Result<Option<Snapshot>, SourceError> {
        let frame = self.camera.capture_frame()?;
        if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "dark frame, no snapshot");
            return Ok(None);
        }
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;
        self.sequence += 1;
        Ok(Some(Snapshot {
            jpeg,
            width: frame.width,
            height: frame.height,
            sequence: self.sequence,
        }))
    }
}
