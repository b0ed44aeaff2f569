//! Source decoding: every supported media kind ends up as an upright RGB
//! image.
//!
//! - Raster: `image` crate, with a `turbojpeg` fast path for JPEG
//!   (feature-gated).
//! - RAW: `rawloader` plus a small development step, see [`super::raw`].
//! - Video: one frame pulled out by an external `ffmpeg` into a temporary
//!   JPEG, which is then decoded as raster.
//!
//! Raster and RAW sources have their EXIF orientation applied.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use image::RgbImage;
use tracing::debug;

use crate::config::ThumbnailConfig;
use crate::domain::MediaKind;
use crate::error::ThumbnailError;

/// Turns a source file into pixels. Implementations must be shareable across
/// worker threads.
pub trait SourceDecoder: Send + Sync {
    fn decode(&self, source: &Path) -> Result<RgbImage, ThumbnailError>;
}

/// Default decoder dispatching on [`MediaKind`].
#[derive(Debug, Clone)]
pub struct MediaDecoder {
    ffmpeg_program: PathBuf,
    frame_offset: Duration,
}

impl MediaDecoder {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            ffmpeg_program: config.ffmpeg_program.clone(),
            frame_offset: config.video_frame_offset,
        }
    }

    /// Grab one frame at the configured offset. Clips shorter than the offset
    /// fall back to their first frame.
    fn decode_video(&self, source: &Path) -> Result<RgbImage, ThumbnailError> {
        let frame = self.extract_frame(source, self.frame_offset)?;
        let frame = match frame {
            Some(frame) => frame,
            None if !self.frame_offset.is_zero() => self
                .extract_frame(source, Duration::ZERO)?
                .ok_or_else(|| frame_error(source, "ffmpeg produced no frame"))?,
            None => return Err(frame_error(source, "ffmpeg produced no frame")),
        };

        // The temporary frame is deleted when `frame` drops, on either path.
        let image = image::open(&frame).map_err(|e| frame_error(source, e))?;
        Ok(image.to_rgb8())
    }

    /// Run ffmpeg into a temporary JPEG. `Ok(None)` means ffmpeg ran but
    /// wrote nothing.
    fn extract_frame(
        &self,
        source: &Path,
        offset: Duration,
    ) -> Result<Option<tempfile::TempPath>, ThumbnailError> {
        let frame = tempfile::Builder::new()
            .prefix("photon-frame-")
            .suffix(".jpg")
            .tempfile()
            .map_err(|e| frame_error(source, e))?
            .into_temp_path();

        let output = Command::new(&self.ffmpeg_program)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-ss"])
            .arg(format!("{:.3}", offset.as_secs_f64()))
            .arg("-i")
            .arg(source)
            .args(["-frames:v", "1"])
            .arg(&*frame)
            .output()
            .map_err(|e| {
                frame_error(
                    source,
                    format!("could not run {}: {e}", self.ffmpeg_program.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(frame_error(
                source,
                format!("ffmpeg exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let written = std::fs::metadata(&frame).map(|m| m.len()).unwrap_or(0);
        debug!(source = %source.display(), offset = ?offset, bytes = written, "extracted video frame");
        Ok((written > 0).then_some(frame))
    }
}

impl SourceDecoder for MediaDecoder {
    fn decode(&self, source: &Path) -> Result<RgbImage, ThumbnailError> {
        match MediaKind::from_path(source) {
            MediaKind::Raster => decode_raster(source),
            MediaKind::Raw => super::raw::decode_raw(source),
            MediaKind::Video => self.decode_video(source),
        }
    }
}

fn frame_error(source: &Path, message: impl ToString) -> ThumbnailError {
    ThumbnailError::FrameExtraction {
        path: source.to_path_buf(),
        message: message.to_string(),
    }
}

pub(crate) fn decode_error(source: &Path, message: impl ToString) -> ThumbnailError {
    ThumbnailError::Decode {
        path: source.to_path_buf(),
        message: message.to_string(),
    }
}

/// Decode a still image and rotate it upright.
pub fn decode_raster(source: &Path) -> Result<RgbImage, ThumbnailError> {
    #[cfg(feature = "turbojpeg")]
    if is_jpeg(source) {
        if let Some(image) = decode_jpeg_turbo(source) {
            return Ok(orient(image, read_exif_orientation(source)));
        }
    }

    let image = image::open(source).map_err(|e| decode_error(source, e))?;
    Ok(orient(image.to_rgb8(), read_exif_orientation(source)))
}

#[cfg(feature = "turbojpeg")]
fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

/// Full-resolution RGB decode through libjpeg-turbo. `None` lets the caller
/// fall back to the `image` crate, which reports a proper error.
#[cfg(feature = "turbojpeg")]
fn decode_jpeg_turbo(path: &Path) -> Option<RgbImage> {
    let jpeg_data = std::fs::read(path).ok()?;
    let mut decompressor = turbojpeg::Decompressor::new().ok()?;
    let header = decompressor.read_header(&jpeg_data).ok()?;
    let (w, h) = (header.width, header.height);

    let mut buf = vec![0u8; w * h * 3];
    let output = turbojpeg::Image {
        pixels: buf.as_mut_slice(),
        width: w,
        pitch: w * 3,
        height: h,
        format: turbojpeg::PixelFormat::RGB,
    };
    decompressor.decompress(&jpeg_data, output).ok()?;

    RgbImage::from_raw(w as u32, h as u32, buf)
}

/// EXIF orientation tag (1-8). 1 (normal) when missing or unreadable.
pub fn read_exif_orientation(path: &Path) -> u8 {
    let read = || -> Option<u8> {
        let file = std::fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().filter(|o| (1..=8).contains(o)).unwrap_or(1)
}

/// Apply an EXIF orientation.
///
/// 1: Normal                    5: Mirror + rotate 90° CW
/// 2: Mirror horizontal         6: Rotate 90° CW
/// 3: Rotate 180°               7: Mirror + rotate 90° CCW
/// 4: Mirror vertical           8: Rotate 90° CCW
pub fn orient(image: RgbImage, orientation: u8) -> RgbImage {
    if !(2..=8).contains(&orientation) {
        return image;
    }

    let (w, h) = (image.width() as usize, image.height() as usize);
    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };
    let buf = image.as_raw();
    let mut out = vec![0u8; w * h * 3];

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                _ => (y, w - 1 - x),
            };
            let src = (y * w + x) * 3;
            let dst = (dy * new_w + dx) * 3;
            out[dst..dst + 3].copy_from_slice(&buf[src..src + 3]);
        }
    }

    RgbImage::from_raw(new_w as u32, new_h as u32, out).unwrap_or(image)
}
