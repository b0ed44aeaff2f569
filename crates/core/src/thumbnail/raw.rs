//! Camera RAW to RGB, good enough for a preview.
//!
//! Bayer data is demosaiced by 2x2 superpixel at half resolution. Levels are
//! normalized per channel and the as-shot white balance is applied before sRGB
//! gamma encoding. No exposure adjustment is made; a dark frame stays dark.

use std::path::Path;

use image::RgbImage;
use rawloader::RawImageData;

use super::decode::{decode_error, orient, read_exif_orientation};
use crate::error::ThumbnailError;

pub fn decode_raw(source: &Path) -> Result<RgbImage, ThumbnailError> {
    let raw = rawloader::decode_file(source).map_err(|e| decode_error(source, format!("{e:?}")))?;

    let samples = match &raw.data {
        RawImageData::Integer(data) => Samples::Integer(data),
        RawImageData::Float(data) => Samples::Float(data),
    };
    let sensor = Sensor {
        width: raw.width,
        height: raw.height,
        cpp: raw.cpp,
        samples,
        black: raw.blacklevels.map(f32::from),
        white: raw.whitelevels.map(f32::from),
        wb: white_balance(raw.wb_coeffs),
        color_at: |row: usize, col: usize| raw.cfa.color_at(row, col),
    };

    let image = develop(&sensor).map_err(|message| decode_error(source, message))?;
    Ok(orient(image, read_exif_orientation(source)))
}

enum Samples<'a> {
    Integer(&'a [u16]),
    /// Already normalized to 0..1.
    Float(&'a [f32]),
}

impl Samples<'_> {
    fn len(&self) -> usize {
        match self {
            Samples::Integer(d) => d.len(),
            Samples::Float(d) => d.len(),
        }
    }
}

struct Sensor<'a, F> {
    width: usize,
    height: usize,
    cpp: usize,
    samples: Samples<'a>,
    black: [f32; 4],
    white: [f32; 4],
    /// Multipliers for R, G, B with green at 1.
    wb: [f32; 3],
    /// CFA color at a sensor position: 0 red, 1 green, 2 blue, 3 second green.
    color_at: F,
}

impl<F: Fn(usize, usize) -> usize> Sensor<'_, F> {
    /// Sample `index` scaled to 0..1 using the levels of channel `channel`.
    fn level(&self, index: usize, channel: usize) -> f32 {
        match self.samples {
            Samples::Float(data) => data[index],
            Samples::Integer(data) => {
                let black = self.black[channel];
                let range = (self.white[channel] - black).max(1.0);
                (f32::from(data[index]) - black) / range
            }
        }
    }
}

/// Camera multipliers normalized to green. Unusable values count as 1.
fn white_balance(coeffs: [f32; 4]) -> [f32; 3] {
    let usable = |c: f32| if c.is_finite() && c > 0.0 { c } else { 1.0 };
    let green = usable(coeffs[1]);
    [usable(coeffs[0]) / green, 1.0, usable(coeffs[2]) / green]
}

fn srgb_gamma(linear: f32) -> u8 {
    let v = linear.clamp(0.0, 1.0);
    let encoded = if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round().clamp(0.0, 255.0) as u8
}

fn develop<F: Fn(usize, usize) -> usize>(sensor: &Sensor<'_, F>) -> Result<RgbImage, String> {
    let (w, h, cpp) = (sensor.width, sensor.height, sensor.cpp);
    if sensor.samples.len() < w * h * cpp {
        return Err(format!(
            "raw data holds {} samples, expected {}",
            sensor.samples.len(),
            w * h * cpp
        ));
    }

    match cpp {
        1 => develop_bayer(sensor),
        3 => Ok(develop_linear(sensor)),
        other => Err(format!("unsupported raw layout with {other} components per pixel")),
    }
}

fn develop_bayer<F: Fn(usize, usize) -> usize>(sensor: &Sensor<'_, F>) -> Result<RgbImage, String> {
    let (out_w, out_h) = (sensor.width / 2, sensor.height / 2);
    if out_w == 0 || out_h == 0 {
        return Err(format!("raw image too small: {}x{}", sensor.width, sensor.height));
    }

    let mut out = RgbImage::new(out_w as u32, out_h as u32);
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sums = [0f32; 3];
            let mut counts = [0u32; 3];
            for dy in 0..2 {
                for dx in 0..2 {
                    let (row, col) = (oy * 2 + dy, ox * 2 + dx);
                    let color = (sensor.color_at)(row, col).min(3);
                    let value = sensor.level(row * sensor.width + col, color);
                    let channel = if color == 3 { 1 } else { color };
                    sums[channel] += value;
                    counts[channel] += 1;
                }
            }
            let mut rgb = [0u8; 3];
            for c in 0..3 {
                let mean = if counts[c] > 0 { sums[c] / counts[c] as f32 } else { 0.0 };
                rgb[c] = srgb_gamma(mean * sensor.wb[c]);
            }
            out.put_pixel(ox as u32, oy as u32, image::Rgb(rgb));
        }
    }
    Ok(out)
}

fn develop_linear<F: Fn(usize, usize) -> usize>(sensor: &Sensor<'_, F>) -> RgbImage {
    let mut out = RgbImage::new(sensor.width as u32, sensor.height as u32);
    for y in 0..sensor.height {
        for x in 0..sensor.width {
            let base = (y * sensor.width + x) * 3;
            let mut rgb = [0u8; 3];
            for c in 0..3 {
                rgb[c] = srgb_gamma(sensor.level(base + c, c) * sensor.wb[c]);
            }
            out.put_pixel(x as u32, y as u32, image::Rgb(rgb));
        }
    }
    out
}
