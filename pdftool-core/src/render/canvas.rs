//! RGB canvas, scanline coverage rasterizer and clip masks.

use crate::graphics::matrix::Matrix;
use crate::graphics::path::Point;

/// Vertical samples per pixel row when anti-aliasing.
const SUBSAMPLES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

impl FillRule {
    fn inside(self, winding: i32) -> bool {
        match self {
            FillRule::NonZero => winding != 0,
            FillRule::EvenOdd => winding % 2 != 0,
        }
    }
}

/// Coverage of a shape over its pixel bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Coverage {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        if x < self.x0 || y < self.y0 || x >= self.x0 + self.width || y >= self.y0 + self.height {
            return 0;
        }
        self.data[(y - self.y0) * self.width + (x - self.x0)]
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    top: f64,
    bottom: f64,
    x_top: f64,
    slope: f64,
    direction: i32,
}

/// Rasterizes closed polygons (device pixels, y down) into coverage.
/// Returns `None` when nothing falls on the canvas.
pub fn rasterize(
    polygons: &[Vec<Point>],
    width: usize,
    height: usize,
    rule: FillRule,
    anti_alias: bool,
) -> Option<Coverage> {
    let mut edges = Vec::new();
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    for polygon in polygons {
        if polygon.len() < 2 || polygon.iter().any(|p| !p.0.is_finite() || !p.1.is_finite()) {
            continue;
        }
        for (i, &a) in polygon.iter().enumerate() {
            let b = polygon[(i + 1) % polygon.len()];
            min_x = min_x.min(a.0);
            max_x = max_x.max(a.0);
            if a.1 == b.1 {
                continue;
            }
            let (top, bottom, direction) = if a.1 < b.1 { (a, b, 1) } else { (b, a, -1) };
            edges.push(Edge {
                top: top.1,
                bottom: bottom.1,
                x_top: top.0,
                slope: (bottom.0 - top.0) / (bottom.1 - top.1),
                direction,
            });
        }
    }
    if edges.is_empty() {
        return None;
    }

    let min_y = edges.iter().map(|e| e.top).fold(f64::INFINITY, f64::min);
    let max_y = edges.iter().map(|e| e.bottom).fold(f64::NEG_INFINITY, f64::max);
    let x0 = min_x.floor().max(0.0) as usize;
    let x1 = (max_x.ceil().max(0.0) as usize).min(width);
    let y0 = min_y.floor().max(0.0) as usize;
    let y1 = (max_y.ceil().max(0.0) as usize).min(height);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let box_width = x1 - x0;
    let mut data = vec![0u8; box_width * (y1 - y0)];
    let mut row = vec![0f32; box_width];
    let samples = if anti_alias { SUBSAMPLES } else { 1 };

    edges.sort_by(|a, b| a.top.total_cmp(&b.top));
    let mut next_edge = 0;
    let mut active: Vec<Edge> = Vec::new();
    let mut crossings: Vec<(f64, i32)> = Vec::new();

    for y in y0..y1 {
        row.iter_mut().for_each(|v| *v = 0.0);
        for s in 0..samples {
            let sy = y as f64 + (s as f64 + 0.5) / samples as f64;
            while next_edge < edges.len() && edges[next_edge].top <= sy {
                active.push(edges[next_edge]);
                next_edge += 1;
            }
            active.retain(|e| e.bottom > sy);

            crossings.clear();
            crossings.extend(
                active
                    .iter()
                    .filter(|e| e.top <= sy)
                    .map(|e| (e.x_top + (sy - e.top) * e.slope, e.direction)),
            );
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            let mut span_start = None;
            for &(x, direction) in &crossings {
                let was_inside = rule.inside(winding);
                winding += direction;
                match (was_inside, rule.inside(winding)) {
                    (false, true) => span_start = Some(x),
                    (true, false) => {
                        if let Some(start) = span_start.take() {
                            add_span(&mut row, x0, start, x, samples, anti_alias);
                        }
                    }
                    _ => {}
                }
            }
        }

        let out = &mut data[(y - y0) * box_width..(y - y0 + 1) * box_width];
        for (dst, &value) in out.iter_mut().zip(&row) {
            *dst = (value.min(1.0) * 255.0).round() as u8;
        }
    }

    Some(Coverage {
        x0,
        y0,
        width: box_width,
        height: y1 - y0,
        data,
    })
}

fn add_span(row: &mut [f32], x0: usize, start: f64, end: f64, samples: usize, anti_alias: bool) {
    let lo = x0 as f64;
    let hi = (x0 + row.len()) as f64;
    let (start, end) = (start.clamp(lo, hi), end.clamp(lo, hi));
    if end <= start {
        return;
    }
    let weight = 1.0 / samples as f32;

    if !anti_alias {
        // Pixels whose centre lies in the span.
        let first = (start - 0.5).ceil().max(lo) as usize;
        let last = ((end - 0.5).ceil().max(lo) as usize).min(x0 + row.len());
        for x in first..last {
            row[x - x0] += 1.0;
        }
        return;
    }

    let first = start.floor() as usize;
    let last = (end.ceil() as usize).min(x0 + row.len());
    for x in first..last {
        let overlap = (end.min(x as f64 + 1.0) - start.max(x as f64)).max(0.0);
        row[x - x0] += overlap as f32 * weight;
    }
}

/// A clip region: coverage over the whole canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Mask {
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn from_coverage(coverage: Option<&Coverage>, width: usize, height: usize) -> Self {
        let mut mask = Self::empty(width, height);
        if let Some(coverage) = coverage {
            for y in 0..coverage.height {
                let start = (coverage.y0 + y) * width + coverage.x0;
                mask.data[start..start + coverage.width]
                    .copy_from_slice(&coverage.data[y * coverage.width..(y + 1) * coverage.width]);
            }
        }
        mask
    }

    /// This mask restricted to `coverage`.
    pub fn intersect(&self, coverage: Option<&Coverage>) -> Self {
        let mut mask = Self::empty(self.width, self.height);
        if let Some(coverage) = coverage {
            for y in coverage.y0..coverage.y0 + coverage.height {
                for x in coverage.x0..coverage.x0 + coverage.width {
                    let index = y * self.width + x;
                    mask.data[index] = mul(self.data[index], coverage.get(x, y));
                }
            }
        }
        mask
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data.get(y * self.width + x).copied().unwrap_or(0)
    }
}

fn mul(a: u8, b: u8) -> u8 {
    ((u16::from(a) * u16::from(b) + 127) / 255) as u8
}

/// A sampled image to composite: RGB pixels or a stencil painted in one
/// colour, plus optional per-pixel alpha.
pub struct ImageSource<'a> {
    pub width: usize,
    pub height: usize,
    pub rgb: &'a [u8],
    pub alpha: Option<&'a [u8]>,
    pub stencil_color: Option<[u8; 3]>,
}

/// White RGB drawing surface.
#[derive(Debug, Clone)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width * height * 3],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    fn blend(&mut self, x: usize, y: usize, color: [u8; 3], alpha: f64) {
        if alpha <= 0.0 {
            return;
        }
        let i = (y * self.width + x) * 3;
        let alpha = alpha.min(1.0);
        for (k, &c) in color.iter().enumerate() {
            let dst = f64::from(self.pixels[i + k]);
            self.pixels[i + k] = (dst + (f64::from(c) - dst) * alpha).round() as u8;
        }
    }

    /// Paints `color` through a coverage, scaled by `alpha` and the clip.
    pub fn fill(&mut self, coverage: &Coverage, color: [u8; 3], alpha: f64, clip: Option<&Mask>) {
        for y in 0..coverage.height {
            for x in 0..coverage.width {
                let value = coverage.data[y * coverage.width + x];
                if value == 0 {
                    continue;
                }
                let (px, py) = (coverage.x0 + x, coverage.y0 + y);
                let clip_value = clip.map_or(255, |m| m.get(px, py));
                let a = f64::from(value) / 255.0 * alpha * f64::from(clip_value) / 255.0;
                self.blend(px, py, color, a);
            }
        }
    }

    /// Composites an image whose unit square is mapped to the device by `m`.
    /// Samples are taken nearest-neighbour at pixel centres.
    pub fn draw_image(&mut self, image: &ImageSource<'_>, m: &Matrix, alpha: f64, clip: Option<&Mask>) {
        let Some(inverse) = m.invert() else {
            return;
        };
        if image.width == 0 || image.height == 0 {
            return;
        }
        let corners = [m.apply(0.0, 0.0), m.apply(1.0, 0.0), m.apply(0.0, 1.0), m.apply(1.0, 1.0)];
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
            return;
        }
        let x0 = min_x.floor().max(0.0) as usize;
        let x1 = (max_x.ceil().max(0.0) as usize).min(self.width);
        let y0 = min_y.floor().max(0.0) as usize;
        let y1 = (max_y.ceil().max(0.0) as usize).min(self.height);

        for py in y0..y1 {
            for px in x0..x1 {
                let (u, v) = inverse.apply(px as f64 + 0.5, py as f64 + 0.5);
                if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                    continue;
                }
                let col = ((u * image.width as f64) as usize).min(image.width - 1);
                let row = (((1.0 - v) * image.height as f64) as usize).min(image.height - 1);
                let index = row * image.width + col;

                let sample_alpha = image
                    .alpha
                    .map_or(255, |a| a.get(index).copied().unwrap_or(255));
                let clip_value = clip.map_or(255, |c| c.get(px, py));
                let a = alpha * f64::from(sample_alpha) / 255.0 * f64::from(clip_value) / 255.0;
                let color = match image.stencil_color {
                    Some(color) => color,
                    None => {
                        let i = index * 3;
                        match image.rgb.get(i..i + 3) {
                            Some(rgb) => [rgb[0], rgb[1], rgb[2]],
                            None => continue,
                        }
                    }
                };
                self.blend(px, py, color, a);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<Point> {
        vec![(x, y), (x + size, y), (x + size, y + size), (x, y + size)]
    }

    #[test]
    fn test_pixel_aligned_square_has_full_coverage() {
        let coverage = rasterize(&[square(2.0, 2.0, 4.0)], 10, 10, FillRule::NonZero, true).unwrap();
        assert_eq!((coverage.x0, coverage.y0, coverage.width, coverage.height), (2, 2, 4, 4));
        assert!(coverage.data.iter().all(|&v| v == 255));
        assert_eq!(coverage.get(1, 1), 0);
    }

    #[test]
    fn test_half_pixel_edge_is_antialiased() {
        let coverage = rasterize(&[square(0.5, 0.0, 2.0)], 4, 4, FillRule::NonZero, true).unwrap();
        assert_eq!(coverage.get(0, 0), 128);
        assert_eq!(coverage.get(1, 0), 255);
        assert_eq!(coverage.get(2, 0), 128);
    }

    #[test]
    fn test_aliased_fill_uses_pixel_centres() {
        let coverage = rasterize(&[square(0.5, 0.0, 2.0)], 4, 4, FillRule::NonZero, false).unwrap();
        // Centres at 0.5 and 1.5 fall in [0.5, 2.5); 2.5 does not.
        assert_eq!(coverage.get(0, 0), 255);
        assert_eq!(coverage.get(1, 0), 255);
        assert_eq!(coverage.get(2, 0), 0);
    }

    #[test]
    fn test_even_odd_leaves_hole() {
        let outer = square(0.0, 0.0, 6.0);
        let inner = square(2.0, 2.0, 2.0);
        let nonzero = rasterize(&[outer.clone(), inner.clone()], 6, 6, FillRule::NonZero, true).unwrap();
        let even_odd = rasterize(&[outer, inner], 6, 6, FillRule::EvenOdd, true).unwrap();
        assert_eq!(nonzero.get(3, 3), 255);
        assert_eq!(even_odd.get(3, 3), 0);
        assert_eq!(even_odd.get(1, 1), 255);
    }

    #[test]
    fn test_offscreen_shape_is_skipped() {
        assert!(rasterize(&[square(20.0, 20.0, 2.0)], 10, 10, FillRule::NonZero, true).is_none());
        assert!(rasterize(&[], 10, 10, FillRule::NonZero, true).is_none());
    }

    #[test]
    fn test_fill_respects_clip() {
        let mut canvas = Canvas::new(4, 1);
        let clip_cov = rasterize(&[square(0.0, 0.0, 2.0)], 4, 1, FillRule::NonZero, true);
        let clip = Mask::from_coverage(clip_cov.as_ref(), 4, 1);
        let fill = rasterize(&[square(0.0, 0.0, 4.0)], 4, 1, FillRule::NonZero, true).unwrap();
        canvas.fill(&fill, [0, 0, 0], 1.0, Some(&clip));
        assert_eq!(canvas.pixel(1, 0), [0, 0, 0]);
        assert_eq!(canvas.pixel(2, 0), [255, 255, 255]);
    }

    #[test]
    fn test_mask_intersection() {
        let a = rasterize(&[square(0.0, 0.0, 2.0)], 4, 1, FillRule::NonZero, true);
        let b = rasterize(&[square(1.0, 0.0, 3.0)], 4, 1, FillRule::NonZero, true);
        let mask = Mask::from_coverage(a.as_ref(), 4, 1).intersect(b.as_ref());
        assert_eq!(mask.get(0, 0), 0);
        assert_eq!(mask.get(1, 0), 255);
        assert_eq!(mask.get(2, 0), 0);
    }

    #[test]
    fn test_draw_image_maps_top_row_to_top() {
        let mut canvas = Canvas::new(2, 2);
        // 1x2 image: red on top, blue below.
        let rgb = [255, 0, 0, 0, 0, 255];
        let image = ImageSource {
            width: 1,
            height: 2,
            rgb: &rgb,
            alpha: None,
            stencil_color: None,
        };
        // Unit square to the 2x2 canvas, y flipped.
        let m = Matrix::new(2.0, 0.0, 0.0, -2.0, 0.0, 2.0);
        canvas.draw_image(&image, &m, 1.0, None);
        assert_eq!(canvas.pixel(0, 0), [255, 0, 0]);
        assert_eq!(canvas.pixel(1, 1), [0, 0, 255]);
    }
}
