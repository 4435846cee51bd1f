use std::io;
use std::path::{Path, PathBuf};

#[cfg(feature = "v4l2")]
pub use device::{auto_detect_device, FoundDevice};

/// Image files in `dir` that the replay source can load, in name order.
pub fn collect_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn is_jpeg(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("jpg" | "jpeg"))
}

fn is_image(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("jpg" | "jpeg" | "png"))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(feature = "v4l2")]
mod device {
    use serde::{Deserialize, Serialize};
    use tracing::info;
    use v4l::{capability::Flags, video::Capture, Device, FourCC};

    use crate::capture::frame::PixelFormat;
    use crate::capture::CameraError;

    // Detected capture device info
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FoundDevice {
        pub path: String,
        pub format: PixelFormat,
    }

    /// Auto-detect best capture device
    pub fn auto_detect_device() -> Result<FoundDevice, CameraError> {
        use std::path::Path;

        info!("Auto-detecting capture devices...");

        for i in 0..10 {
            let path = format!("/dev/video{}", i);
            if !Path::new(&path).exists() {
                continue;
            }

            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                continue;
            }

            // Prefer MJPEG, YUYV keeps the luma plane cheap to extract
            for fmt in dev.enum_formats().unwrap_or_default() {
                let format = if fmt.fourcc == FourCC::new(b"MJPG") {
                    PixelFormat::Mjpeg
                } else if fmt.fourcc == FourCC::new(b"YUYV") {
                    PixelFormat::Yuyv4
                } else {
                    continue;
                };
                info!("Found {:?} device: {} - {}", format, path, caps.card);
                return Ok(FoundDevice { path, format });
            }
        }

        Err(CameraError::Unavailable("no suitable capture device found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let found: Vec<_> = collect_images(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["a.JPG", "b.png", "c.jpeg"]);
    }
}
