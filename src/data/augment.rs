//! Image augmentation applied by the image-folder source before batching.
//!
//! Every function here is pure apart from the random number generator passed
//! in: an image goes in, a new image comes out. Square crops of side
//! `width` are taken after scaling the shortest side to `width`.
use std::f64::consts::FRAC_PI_4;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use rand::Rng;

/// Largest training rotation, either way, in degrees.
pub const TRAINING_ROTATION_DEGREES: f64 = 15.0;

/// Which transform, crop and flips to apply to each decoded image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Augmentation {
    /// Random rotation in `±rotation_degrees` and magnification by a factor
    /// drawn from `zoom` (inclusive), then a random square crop and
    /// optionally random horizontal and vertical flips.
    RandomCrop {
        flips: bool,
        rotation_degrees: f64,
        zoom: (f64, f64),
    },
    /// Deterministic centred square crop.
    CenterCrop,
}

impl Augmentation {
    /// The augmentation used for training data.
    ///
    /// The upper zoom bound `sqrt(2) * cos(45° - 15°)` magnifies just enough
    /// that a 15° rotation leaves no empty corners in the frame.
    pub fn training() -> Augmentation {
        let max_zoom = 2f64.sqrt() * (FRAC_PI_4 - TRAINING_ROTATION_DEGREES.to_radians()).cos();
        Augmentation::RandomCrop {
            flips: true,
            rotation_degrees: TRAINING_ROTATION_DEGREES,
            zoom: (1.0, max_zoom),
        }
    }

    /// The augmentation used for validation and test data.
    pub fn evaluation() -> Augmentation {
        Augmentation::CenterCrop
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, width: u32, rng: &mut R) -> DynamicImage {
        match *self {
            Augmentation::CenterCrop => center_crop(img, width),
            Augmentation::RandomCrop { flips, rotation_degrees, zoom } => {
                let mut resized = resize_shortest_side(img, width);
                if rotation_degrees != 0.0 || zoom != (1.0, 1.0) {
                    let degrees = rng.gen_range(-rotation_degrees.abs()..=rotation_degrees.abs());
                    let factor = rng.gen_range(zoom.0.min(zoom.1)..=zoom.0.max(zoom.1));
                    resized = rotate_and_zoom(&resized, degrees, factor);
                }
                let mut out = crop_at_random(&resized, width, rng);
                if flips {
                    if rng.gen_bool(0.5) {
                        out = out.fliph();
                    }
                    if rng.gen_bool(0.5) {
                        out = out.flipv();
                    }
                }
                out
            }
        }
    }
}

/// Scales `img` so that its shorter side equals `width`, keeping the aspect
/// ratio. The longer side is rounded and never smaller than `width`.
pub fn resize_shortest_side(img: &DynamicImage, width: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let (new_w, new_h) = if w <= h {
        (width, scale_side(h, width, w))
    } else {
        (scale_side(w, width, h), width)
    };
    img.resize_exact(new_w, new_h, FilterType::Triangle)
}

fn scale_side(long: u32, target: u32, short: u32) -> u32 {
    let scaled = (f64::from(long) * f64::from(target) / f64::from(short)).round() as u32;
    scaled.max(target)
}

/// Centred `width × width` crop. The start offset along the long side is
/// `floor((long - width) / 2)`.
pub fn center_crop(img: &DynamicImage, width: u32) -> DynamicImage {
    let resized = resize_shortest_side(img, width);
    let (w, h) = resized.dimensions();
    resized.crop_imm((w - width) / 2, (h - width) / 2, width, width)
}

/// `width × width` crop at a uniformly random offset along the long side.
pub fn random_crop<R: Rng + ?Sized>(img: &DynamicImage, width: u32, rng: &mut R) -> DynamicImage {
    crop_at_random(&resize_shortest_side(img, width), width, rng)
}

/// `resized` must be at least `width` on both sides.
fn crop_at_random<R: Rng + ?Sized>(resized: &DynamicImage, width: u32, rng: &mut R) -> DynamicImage {
    let (w, h) = resized.dimensions();
    let x = rng.gen_range(0..=w - width);
    let y = rng.gen_range(0..=h - width);
    resized.crop_imm(x, y, width, width)
}

/// Rotates `img` by `degrees` about its centre and magnifies it by `zoom`,
/// keeping the original dimensions. Sampling is bilinear; points that fall
/// outside the source take the nearest edge pixel.
pub fn rotate_and_zoom(img: &DynamicImage, degrees: f64, zoom: f64) -> DynamicImage {
    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
    let (sin, cos) = (-degrees.to_radians()).sin_cos();
    let out = RgbImage::from_fn(w, h, |x, y| {
        // Inverse map: output pixel centre back into the source.
        let dx = (f64::from(x) + 0.5 - cx) / zoom;
        let dy = (f64::from(y) + 0.5 - cy) / zoom;
        let sx = cos * dx - sin * dy + cx - 0.5;
        let sy = sin * dx + cos * dy + cy - 0.5;
        bilinear(&src, sx, sy)
    });
    DynamicImage::ImageRgb8(out)
}

fn bilinear(src: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = src.dimensions();
    let x = x.clamp(0.0, f64::from(w - 1));
    let y = y.clamp(0.0, f64::from(h - 1));
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - f64::from(x0), y - f64::from(y0));
    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let at = |px: u32, py: u32| f64::from(src.get_pixel(px, py).0[c]);
        let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
        let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Flattens an image as R, G, B, R, G, B, ... normalized to [0, 1].
pub fn to_rgb_input(img: &DynamicImage) -> Vec<f64> {
    img.to_rgb8()
        .pixels()
        .flat_map(|p| p.0.iter().map(|&c| f64::from(c) / 255.0))
        .collect()
}
