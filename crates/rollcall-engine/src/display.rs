use crate::events::SessionEvent;
use rollcall_core::{BackingSize, DetectionResult, OverlayRenderer};
use std::path::PathBuf;

/// Overlay renderer plus its optional PNG export.
pub(crate) struct OverlayDisplay {
    renderer: OverlayRenderer,
    export: Option<PathBuf>,
}

impl OverlayDisplay {
    pub(crate) fn new(backing: BackingSize, export: Option<PathBuf>) -> Self {
        Self {
            renderer: OverlayRenderer::new(backing),
            export,
        }
    }

    /// Redraw for one detection result; `native` is the resolution of the
    /// frame that result was computed on.
    pub(crate) fn show(&mut self, result: &DetectionResult, native: (u32, u32)) -> SessionEvent {
        let face_present = self.renderer.render(result, native);
        self.export();
        SessionEvent::Overlay {
            face_present,
            faces: result.faces.len(),
        }
    }

    pub(crate) fn clear(&mut self) -> SessionEvent {
        self.renderer.clear();
        self.export();
        SessionEvent::Overlay {
            face_present: false,
            faces: 0,
        }
    }

    fn export(&self) {
        let Some(path) = &self.export else { return };
        if self.renderer.canvas().width() == 0 {
            return;
        }
        if let Err(e) = self.renderer.save_png(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write overlay");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::BoundingBox;

    #[test]
    fn test_show_exports_png() {
        let path = std::env::temp_dir().join(format!("rollcall-overlay-{}.png", uuid::Uuid::new_v4()));
        let mut display = OverlayDisplay::new(
            BackingSize::Fixed { width: 64, height: 48 },
            Some(path.clone()),
        );
        let result = DetectionResult {
            faces: vec![BoundingBox { x: 100.0, y: 100.0, width: 200.0, height: 200.0 }],
        };
        let event = display.show(&result, (640, 480));
        assert_eq!(event, SessionEvent::Overlay { face_present: true, faces: 1 });

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_follow_source_canvas_is_not_exported() {
        let path = std::env::temp_dir().join(format!("rollcall-overlay-{}.png", uuid::Uuid::new_v4()));
        let mut display = OverlayDisplay::new(BackingSize::FollowSource, Some(path.clone()));
        assert_eq!(display.clear(), SessionEvent::Overlay { face_present: false, faces: 0 });
        assert!(!path.exists());
    }
}
