//! Template matching by zero-mean normalised cross correlation (ZNCC).
//!
//! Both images are converted to greyscale and downscaled by the same factor
//! so the longest screenshot side is at most `max_dimension`. Window sums
//! come from integral images; only the cross term is computed per window.
use crate::{errors::VisualError, models::MatchResult};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

pub fn decode_gray(data: &[u8]) -> Result<GrayImage, VisualError> {
    let img: DynamicImage = image::load_from_memory(data)
        .map_err(|e| VisualError::ImageProcessing(format!("Failed to decode image: {}", e)))?;
    Ok(img.to_luma8())
}

/// Best match of `template` inside `screen`, in full-resolution screen
/// pixels. `None` when the template does not fit or carries no contrast.
pub fn match_template(
    screen: &GrayImage,
    template: &GrayImage,
    max_dimension: u32,
) -> Option<MatchResult> {
    if template.width() == 0 || template.height() == 0 || screen.width() == 0 || screen.height() == 0 {
        return None;
    }
    let longest = screen.width().max(screen.height());
    let scale = if max_dimension > 0 && longest > max_dimension {
        max_dimension as f64 / longest as f64
    } else {
        1.0
    };

    let (screen_small, template_small) = if scale < 1.0 {
        (
            resize(screen, scale),
            resize(template, scale),
        )
    } else {
        (screen.clone(), template.clone())
    };
    let (score, x, y) = best_zncc(&screen_small, &template_small)?;
    Some(MatchResult {
        score,
        x: x as f64 / scale,
        y: y as f64 / scale,
        width: template.width() as f64,
        height: template.height() as f64,
    })
}

fn resize(img: &GrayImage, scale: f64) -> GrayImage {
    let width = ((img.width() as f64 * scale).round() as u32).max(1);
    let height = ((img.height() as f64 * scale).round() as u32).max(1);
    imageops::resize(img, width, height, FilterType::Triangle)
}

struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let width = img.width() as usize + 1;
        let height = img.height() as usize + 1;
        let mut sum = vec![0.0; width * height];
        let mut sq = vec![0.0; width * height];
        for y in 1..height {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 1..width {
                let v = img.get_pixel(x as u32 - 1, y as u32 - 1)[0] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[y * width + x] = sum[(y - 1) * width + x] + row_sum;
                sq[y * width + x] = sq[(y - 1) * width + x] + row_sq;
            }
        }
        Self { width, sum, sq }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let at = |xx: usize, yy: usize| table[yy * self.width + xx];
        at(x + w, y + h) - at(x, y + h) - at(x + w, y) + at(x, y)
    }
}

fn best_zncc(screen: &GrayImage, template: &GrayImage) -> Option<(f64, u32, u32)> {
    let (sw, sh) = (screen.width() as usize, screen.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw > sw || th > sh {
        return None;
    }
    let n = (tw * th) as f64;
    let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let t_centered: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
    let t_norm = t_centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    if t_norm < 1e-9 {
        return None;
    }

    let integral = Integral::new(screen);
    let raw = screen.as_raw();
    let mut best: Option<(f64, u32, u32)> = None;
    for y in 0..=(sh - th) {
        for x in 0..=(sw - tw) {
            let sum = integral.window(&integral.sum, x, y, tw, th);
            let sq = integral.window(&integral.sq, x, y, tw, th);
            let variance = sq - sum * sum / n;
            if variance <= 1e-9 {
                continue;
            }
            let mut cross = 0.0;
            for ty in 0..th {
                let row = (y + ty) * sw + x;
                let t_row = ty * tw;
                for tx in 0..tw {
                    cross += raw[row + tx] as f64 * t_centered[t_row + tx];
                }
            }
            let score = cross / (variance.sqrt() * t_norm);
            if best.map(|(b, _, _)| score > b).unwrap_or(true) {
                best = Some((score, x as u32, y as u32));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Smooth background with a high-contrast checker patch at (ox, oy).
    fn scene(width: u32, height: u32, ox: u32, oy: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if x >= ox && x < ox + 8 && y >= oy && y < oy + 8 {
                let on = ((x - ox) / 2 + (y - oy) / 2) % 2 == 0;
                Luma([if on { 250 } else { 10 }])
            } else {
                Luma([((x + y) % 50 + 100) as u8])
            }
        })
    }

    #[test]
    fn finds_exact_patch() {
        let screen = scene(64, 48, 30, 20);
        let template = imageops::crop_imm(&screen, 30, 20, 8, 8).to_image();
        let found = match_template(&screen, &template, 480).unwrap();
        assert!(found.score > 0.99, "score {}", found.score);
        assert_eq!((found.x, found.y), (30.0, 20.0));
        assert_eq!(found.center(), (34.0, 24.0));
    }

    #[test]
    fn flat_template_cannot_match() {
        let screen = scene(32, 32, 4, 4);
        let template = GrayImage::from_pixel(4, 4, Luma([80]));
        assert!(match_template(&screen, &template, 480).is_none());
    }

    #[test]
    fn oversize_template_is_rejected() {
        let screen = scene(16, 16, 0, 0);
        let template = scene(32, 8, 0, 0);
        assert!(match_template(&screen, &template, 480).is_none());
    }

    #[test]
    fn downscaled_match_maps_back_to_full_resolution() {
        let screen = GrayImage::from_fn(200, 100, |x, y| {
            if (120..140).contains(&x) && (40..60).contains(&y) {
                Luma([if x < 130 { 255 } else { 0 }])
            } else {
                Luma([128])
            }
        });
        let template = imageops::crop_imm(&screen, 116, 36, 28, 28).to_image();
        let found = match_template(&screen, &template, 100).unwrap();
        assert!(found.score > 0.8, "score {}", found.score);
        let (cx, cy) = found.center();
        assert!((cx - 130.0).abs() <= 3.0, "cx {}", cx);
        assert!((cy - 50.0).abs() <= 3.0, "cy {}", cy);
    }
}
