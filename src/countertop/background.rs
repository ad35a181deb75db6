//! Removes the photography backdrop from slab photos.
//!
//! The backdrop colour is estimated from the four corners, then a flood fill
//! from the image border marks everything close enough to it as background.
//! The foreground is cropped and the remaining background pixels are filled
//! from their nearest foreground neighbours so that the result tiles without
//! holes.

use std::collections::VecDeque;

use image::{Rgba, RgbaImage};
use thiserror::Error;

/// Pixels with less alpha count as background regardless of their colour.
pub const TRANSPARENT_ALPHA: u8 = 8;
pub const THRESHOLD_MARGIN: f32 = 18.0;
pub const MIN_THRESHOLD: f32 = 10.0;
pub const MAX_THRESHOLD: f32 = 90.0;
/// Smallest share of the image the foreground must cover.
pub const MIN_FOREGROUND_FRACTION: f32 = 0.04;
pub const MIN_CROP_SIDE: u32 = 8;
pub const CROP_PADDING: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum Rejection {
    #[error("image is empty")]
    Empty,
    #[error("foreground covers only {:.1}% of the image", .0 * 100.0)]
    ForegroundTooSmall(f32),
    #[error("foreground crop of {width}x{height} is too small")]
    CropTooSmall { width: u32, height: u32 },
}

/// Estimated backdrop colour and the distance up to which a pixel matches it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backdrop {
    pub color: [f32; 3],
    pub threshold: f32,
}

/// Per-pixel background classification, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundMask {
    width: u32,
    height: u32,
    background: Vec<bool>,
}

impl BackgroundMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_background(&self, x: u32, y: u32) -> bool {
        self.background[(y * self.width + x) as usize]
    }

    pub fn foreground_count(&self) -> usize {
        self.background.iter().filter(|b| !**b).count()
    }

    /// Tight bounding box of all foreground pixels.
    pub fn foreground_bounds(&self) -> Option<PixelRect> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0, 0);
        let mut any = false;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.is_background(x, y) {
                    any = true;
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                }
            }
        }
        any.then(|| PixelRect {
            x: min.0,
            y: min.1,
            width: max.0 - min.0 + 1,
            height: max.1 - min.1 + 1,
        })
    }
}

fn distance(pixel: &Rgba<u8>, color: [f32; 3]) -> f32 {
    let [r, g, b, _] = pixel.0;
    let dr = r as f32 - color[0];
    let dg = g as f32 - color[1];
    let db = b as f32 - color[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(f32::total_cmp);
    values[values.len() / 2]
}

/// Backdrop estimate from the four corner patches.
pub fn estimate_backdrop(image: &RgbaImage) -> Option<Backdrop> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let side = (width.min(height) / 16).clamp(2, 32).min(width).min(height);
    let origins = [
        (0, 0),
        (width - side, 0),
        (0, height - side),
        (width - side, height - side),
    ];
    let corners: Vec<&Rgba<u8>> = origins
        .iter()
        .flat_map(|&(ox, oy)| {
            (oy..oy + side).flat_map(move |y| (ox..ox + side).map(move |x| image.get_pixel(x, y)))
        })
        .collect();

    let mut color = [0.0; 3];
    for (channel, value) in color.iter_mut().enumerate() {
        let mut samples: Vec<f32> = corners.iter().map(|p| p.0[channel] as f32).collect();
        *value = median(&mut samples);
    }

    let mut distances: Vec<f32> = corners.iter().map(|p| distance(p, color)).collect();
    distances.sort_by(f32::total_cmp);
    let p85 = distances[((distances.len() - 1) as f32 * 0.85).round() as usize];

    Some(Backdrop {
        color,
        threshold: (p85 + THRESHOLD_MARGIN).clamp(MIN_THRESHOLD, MAX_THRESHOLD),
    })
}

/// Classifies every pixel by flood filling from the border.
pub fn segment(image: &RgbaImage) -> BackgroundMask {
    let (width, height) = image.dimensions();
    let mut background = vec![false; (width * height) as usize];
    let Some(backdrop) = estimate_backdrop(image) else {
        return BackgroundMask {
            width,
            height,
            background,
        };
    };

    let passable = |x: u32, y: u32| {
        let pixel = image.get_pixel(x, y);
        pixel.0[3] < TRANSPARENT_ALPHA || distance(pixel, backdrop.color) <= backdrop.threshold
    };

    let mut queue = VecDeque::new();
    let seed = |x: u32, y: u32, background: &mut [bool], queue: &mut VecDeque<(u32, u32)>| {
        let i = (y * width + x) as usize;
        if !background[i] && passable(x, y) {
            background[i] = true;
            queue.push_back((x, y));
        }
    };
    for x in 0..width {
        seed(x, 0, &mut background, &mut queue);
        seed(x, height - 1, &mut background, &mut queue);
    }
    for y in 0..height {
        seed(0, y, &mut background, &mut queue);
        seed(width - 1, y, &mut background, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        if x > 0 {
            seed(x - 1, y, &mut background, &mut queue);
        }
        if x + 1 < width {
            seed(x + 1, y, &mut background, &mut queue);
        }
        if y > 0 {
            seed(x, y - 1, &mut background, &mut queue);
        }
        if y + 1 < height {
            seed(x, y + 1, &mut background, &mut queue);
        }
    }

    BackgroundMask {
        width,
        height,
        background,
    }
}

/// Crops `image` to its foreground and fills the background left inside the
/// crop. The result is fully opaque.
pub fn try_remove_background(image: &RgbaImage) -> Result<RgbaImage, Rejection> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Rejection::Empty);
    }
    let mask = segment(image);

    let fraction = mask.foreground_count() as f32 / (width * height) as f32;
    if fraction < MIN_FOREGROUND_FRACTION {
        return Err(Rejection::ForegroundTooSmall(fraction));
    }
    let bounds = mask
        .foreground_bounds()
        .ok_or(Rejection::ForegroundTooSmall(0.0))?;
    if bounds.width < MIN_CROP_SIDE || bounds.height < MIN_CROP_SIDE {
        return Err(Rejection::CropTooSmall {
            width: bounds.width,
            height: bounds.height,
        });
    }

    let x0 = bounds.x.saturating_sub(CROP_PADDING);
    let y0 = bounds.y.saturating_sub(CROP_PADDING);
    let x1 = (bounds.x + bounds.width + CROP_PADDING).min(width);
    let y1 = (bounds.y + bounds.height + CROP_PADDING).min(height);
    let crop = PixelRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    };

    Ok(inpaint(image, &mask, crop))
}

/// Like [`try_remove_background`], falling back to the unmodified image.
pub fn remove_background(image: &RgbaImage) -> RgbaImage {
    match try_remove_background(image) {
        Ok(processed) => processed,
        Err(rejection) => {
            log::info!("keeping backdrop: {}", rejection);
            image.clone()
        }
    }
}

fn inpaint(image: &RgbaImage, mask: &BackgroundMask, crop: PixelRect) -> RgbaImage {
    let (w, h) = (crop.width, crop.height);
    let source = |x: u32, y: u32| image.get_pixel(crop.x + x, crop.y + y);
    let is_background = |x: u32, y: u32| mask.is_background(crop.x + x, crop.y + y);

    // nearest foreground colour found so far and its distance
    let mut nearest: Vec<Option<(u32, [u8; 3])>> = vec![None; (w * h) as usize];
    let mut offer = |x: u32, y: u32, candidate: Option<(u32, [u8; 3])>| {
        let slot = &mut nearest[(y * w + x) as usize];
        if let Some((d, color)) = candidate {
            if slot.is_none_or(|(best, _)| d < best) {
                *slot = Some((d, color));
            }
        }
    };
    let rgb = |p: &Rgba<u8>| [p.0[0], p.0[1], p.0[2]];

    for y in 0..h {
        let mut last: Option<(u32, [u8; 3])> = None;
        for x in 0..w {
            if is_background(x, y) {
                offer(x, y, last.map(|(at, c)| (x - at, c)));
            } else {
                last = Some((x, rgb(source(x, y))));
            }
        }
        let mut last: Option<(u32, [u8; 3])> = None;
        for x in (0..w).rev() {
            if is_background(x, y) {
                offer(x, y, last.map(|(at, c)| (at - x, c)));
            } else {
                last = Some((x, rgb(source(x, y))));
            }
        }
    }
    for x in 0..w {
        let mut last: Option<(u32, [u8; 3])> = None;
        for y in 0..h {
            if is_background(x, y) {
                offer(x, y, last.map(|(at, c)| (y - at, c)));
            } else {
                last = Some((y, rgb(source(x, y))));
            }
        }
        let mut last: Option<(u32, [u8; 3])> = None;
        for y in (0..h).rev() {
            if is_background(x, y) {
                offer(x, y, last.map(|(at, c)| (at - y, c)));
            } else {
                last = Some((y, rgb(source(x, y))));
            }
        }
    }

    let mean = foreground_mean(image, mask);
    RgbaImage::from_fn(w, h, |x, y| {
        let [r, g, b] = if is_background(x, y) {
            nearest[(y * w + x) as usize].map_or(mean, |(_, color)| color)
        } else {
            rgb(source(x, y))
        };
        Rgba([r, g, b, 255])
    })
}

fn foreground_mean(image: &RgbaImage, mask: &BackgroundMask) -> [u8; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        if !mask.is_background(x, y) {
            for (s, c) in sum.iter_mut().zip(pixel.0) {
                *s += c as u64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return [255, 255, 255];
    }
    sum.map(|s| (s / count) as u8)
}
