use std::io::{BufWriter, Write};
use std::path::Path;

use fast_image_resize::{self as fir, images::Image as FirImage, FilterType, ResizeAlg, ResizeOptions};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::key::ThumbnailSize;

/// Largest size with the source aspect ratio that fits in `bounds`. Never
/// larger than the source, never zero.
pub fn fit_within(width: u32, height: u32, bounds: ThumbnailSize) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let (max_w, max_h) = (bounds.width(), bounds.height());
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Lanczos3 downscale into `bounds`. Images already inside are returned as is.
pub fn resize_to_fit(image: RgbImage, bounds: ThumbnailSize) -> Result<RgbImage, String> {
    let (src_w, src_h) = image.dimensions();
    let (dst_w, dst_h) = fit_within(src_w, src_h, bounds);
    if (dst_w, dst_h) == (src_w, src_h) {
        return Ok(image);
    }

    let src = FirImage::from_vec_u8(src_w, src_h, image.into_raw(), fir::PixelType::U8x3)
        .map_err(|e| e.to_string())?;
    let mut dst = FirImage::new(dst_w, dst_h, fir::PixelType::U8x3);
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
    fir::Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| e.to_string())?;

    RgbImage::from_raw(dst_w, dst_h, dst.buffer().to_vec())
        .ok_or_else(|| "resized buffer has the wrong length".to_string())
}

/// Encode as JPEG next to `dest` and rename into place, so readers never see
/// a partial file.
pub fn write_jpeg_atomic(image: &RgbImage, quality: u8, dest: &Path) -> Result<(), String> {
    let dir = dest
        .parent()
        .ok_or_else(|| "destination has no parent directory".to_string())?;
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        image
            .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
            .map_err(|e| e.to_string())?;
        writer.flush().map_err(|e| e.to_string())?;
    }
    temp.persist(dest).map_err(|e| e.error.to_string())?;
    Ok(())
}
