//! Image capture. Mirrors `camera.camera`, minus the Raspberry-Pi-specific
//! `PiCamera`/`RPi.GPIO` path: this crate targets the host driver, not the
//! embedded capture side, so only the portable debug/file-based fallback is
//! implemented here. `Capture` is the extension point a caller can implement
//! against their own hardware.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::error::{Error, Result};

/// A source of images to transmit. The Python original dispatches on
/// `useCamera`/`useFlash` inside one `camera` class; here that split is a
/// trait so a real camera binding can be swapped in without touching the
/// transfer engine.
pub trait Capture: Send + Sync {
    /// Captures (or loads) an image and resizes it to `size = (width,
    /// height)`. `flash` requests the capturer light the scene first, if it
    /// has a flash to control.
    fn capture(&self, size: (u32, u32), flash: bool) -> Result<DynamicImage>;
}

/// Loads a fixed image file from disk and resizes it, standing in for a
/// camera module. Used when no hardware capture device is available.
pub struct DebugCapture {
    image_path: PathBuf,
}

impl DebugCapture {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        DebugCapture {
            image_path: image_path.into(),
        }
    }
}

impl Capture for DebugCapture {
    fn capture(&self, size: (u32, u32), _flash: bool) -> Result<DynamicImage> {
        let img = load_image(&self.image_path)?;
        Ok(img.resize_exact(size.0, size.1, image::imageops::FilterType::Lanczos3))
    }
}

fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| Error::Image(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_debug_image_errors_rather_than_panicking() {
        let cap = DebugCapture::new("/this/path/does/not/exist.jpg");
        assert!(cap.capture((160, 120), false).is_err());
    }
}
