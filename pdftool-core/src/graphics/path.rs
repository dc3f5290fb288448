//! Path geometry: construction, flattening, dashing and stroking.
//!
//! Paths are recorded in user space. Filling transforms the segments and
//! flattens in device space; stroking flattens and outlines in user space so
//! that the pen follows the CTM, then transforms the outline polygons.

use std::f64::consts::PI;

use super::matrix::Matrix;

pub type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum LineCap {
    Butt = 0,
    Round = 1,
    Square = 2,
}

impl LineCap {
    pub fn from_operand(value: i64) -> Self {
        match value {
            1 => LineCap::Round,
            2 => LineCap::Square,
            _ => LineCap::Butt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum LineJoin {
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

impl LineJoin {
    pub fn from_operand(value: i64) -> Self {
        match value {
            1 => LineJoin::Round,
            2 => LineJoin::Bevel,
            _ => LineJoin::Miter,
        }
    }
}

/// Line dash pattern (`d` operator).
#[derive(Debug, Clone, PartialEq)]
pub struct LineDashPattern {
    pub array: Vec<f64>,
    pub phase: f64,
}

impl LineDashPattern {
    pub fn new(array: Vec<f64>, phase: f64) -> Self {
        Self { array, phase }
    }

    pub fn solid() -> Self {
        Self {
            array: Vec::new(),
            phase: 0.0,
        }
    }

    /// Empty, negative or all-zero arrays draw solid lines.
    pub fn is_solid(&self) -> bool {
        self.array.is_empty()
            || self.array.iter().any(|v| *v < 0.0)
            || self.array.iter().all(|v| *v == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f64,
    pub dash: LineDashPattern,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: LineDashPattern::solid(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    Close,
}

/// A flattened subpath.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
}

/// A path under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    segments: Vec<Segment>,
    current: Option<Point>,
    start: Option<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn current_point(&self) -> Option<Point> {
        self.current
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        // Consecutive moves collapse into the last one.
        if let Some(Segment::MoveTo(_)) = self.segments.last() {
            self.segments.pop();
        }
        self.segments.push(Segment::MoveTo((x, y)));
        self.current = Some((x, y));
        self.start = Some((x, y));
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        if self.current.is_none() {
            self.move_to(x, y);
            return;
        }
        self.segments.push(Segment::LineTo((x, y)));
        self.current = Some((x, y));
    }

    pub fn curve_to(&mut self, c1: Point, c2: Point, end: Point) {
        if self.current.is_none() {
            self.move_to(c1.0, c1.1);
        }
        self.segments.push(Segment::CurveTo(c1, c2, end));
        self.current = Some(end);
    }

    /// `v`: the first control point is the current point.
    pub fn curve_to_v(&mut self, c2: Point, end: Point) {
        let c1 = self.current.unwrap_or(c2);
        self.curve_to(c1, c2, end);
    }

    /// `y`: the second control point is the end point.
    pub fn curve_to_y(&mut self, c1: Point, end: Point) {
        self.curve_to(c1, end, end);
    }

    pub fn close(&mut self) {
        if self.current.is_some() && !matches!(self.segments.last(), Some(Segment::Close)) {
            self.segments.push(Segment::Close);
            self.current = self.start;
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close();
    }

    pub fn transform(&self, m: &Matrix) -> Path {
        let t = |p: Point| m.apply(p.0, p.1);
        Path {
            segments: self
                .segments
                .iter()
                .map(|s| match *s {
                    Segment::MoveTo(p) => Segment::MoveTo(t(p)),
                    Segment::LineTo(p) => Segment::LineTo(t(p)),
                    Segment::CurveTo(a, b, c) => Segment::CurveTo(t(a), t(b), t(c)),
                    Segment::Close => Segment::Close,
                })
                .collect(),
            current: self.current.map(t),
            start: self.start.map(t),
        }
    }

    /// Flattens curves so that no point strays more than `tolerance` from
    /// the true curve.
    pub fn flatten(&self, tolerance: f64) -> Vec<Polyline> {
        let tolerance = tolerance.max(1e-6);
        let mut out = Vec::new();
        let mut current = Polyline {
            points: Vec::new(),
            closed: false,
        };
        let finish = |line: &mut Polyline, out: &mut Vec<Polyline>| {
            if !line.points.is_empty() {
                out.push(std::mem::replace(
                    line,
                    Polyline {
                        points: Vec::new(),
                        closed: false,
                    },
                ));
            }
        };

        for segment in &self.segments {
            match *segment {
                Segment::MoveTo(p) => {
                    finish(&mut current, &mut out);
                    current.points.push(p);
                }
                Segment::LineTo(p) => current.points.push(p),
                Segment::CurveTo(c1, c2, end) => {
                    let Some(&from) = current.points.last() else {
                        continue;
                    };
                    flatten_cubic(from, c1, c2, end, tolerance, &mut current.points);
                }
                Segment::Close => {
                    let start = current.points.first().copied();
                    current.closed = true;
                    finish(&mut current, &mut out);
                    // Drawing continues from the subpath start.
                    if let Some(start) = start {
                        current.points.push(start);
                    }
                }
            }
        }
        // A trailing lone point after `h` is not a subpath of its own.
        let open_tail = matches!(
            self.segments.last(),
            Some(Segment::MoveTo(_) | Segment::LineTo(_))
        );
        if current.points.len() > 1 || open_tail {
            finish(&mut current, &mut out);
        }
        out
    }
}

fn flatten_cubic(p0: Point, p1: Point, p2: Point, p3: Point, tolerance: f64, out: &mut Vec<Point>) {
    let dd = |a: Point, b: Point, c: Point| (a.0 - 2.0 * b.0 + c.0).hypot(a.1 - 2.0 * b.1 + c.1);
    let d = dd(p0, p1, p2).max(dd(p1, p2, p3));
    let steps = ((0.75 * d / tolerance).sqrt().ceil() as usize).clamp(1, 500);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let e = t * t * t;
        out.push((
            a * p0.0 + b * p1.0 + c * p2.0 + e * p3.0,
            a * p0.1 + b * p1.1 + c * p2.1 + e * p3.1,
        ));
    }
}

/// Splits polylines into dashes. Closed lines are dashed along their full
/// perimeter and come back open.
pub fn dash(lines: &[Polyline], pattern: &LineDashPattern) -> Vec<Polyline> {
    if pattern.is_solid() {
        return lines.to_vec();
    }
    let total: f64 = pattern.array.iter().sum::<f64>()
        * if pattern.array.len() % 2 == 1 { 2.0 } else { 1.0 };
    let cycle: Vec<f64> = if pattern.array.len() % 2 == 1 {
        pattern.array.iter().chain(&pattern.array).copied().collect()
    } else {
        pattern.array.clone()
    };

    let mut out = Vec::new();
    for line in lines {
        let mut points = line.points.clone();
        if line.closed {
            if let Some(&first) = points.first() {
                points.push(first);
            }
        }

        // Position in the pattern at the start of each subpath.
        let mut offset = pattern.phase.rem_euclid(total);
        let mut index = 0;
        while offset >= cycle[index] {
            offset -= cycle[index];
            index = (index + 1) % cycle.len();
        }
        let mut remaining = cycle[index] - offset;
        let mut on = index % 2 == 0;
        let mut dash_points: Vec<Point> = Vec::new();
        if on {
            if let Some(&p) = points.first() {
                dash_points.push(p);
            }
        }

        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let length = (b.0 - a.0).hypot(b.1 - a.1);
            let mut travelled = 0.0;
            while length - travelled > remaining {
                travelled += remaining;
                let t = travelled / length;
                let p = (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
                if on {
                    dash_points.push(p);
                    out.push(Polyline {
                        points: std::mem::take(&mut dash_points),
                        closed: false,
                    });
                } else {
                    dash_points.push(p);
                }
                on = !on;
                index = (index + 1) % cycle.len();
                remaining = cycle[index];
            }
            remaining -= length - travelled;
            if on {
                dash_points.push(b);
            }
        }
        if on && !dash_points.is_empty() {
            out.push(Polyline {
                points: dash_points,
                closed: false,
            });
        }
    }
    out
}

/// Outlines polylines with the pen described by `style`. The polygons all
/// wind counter-clockwise and are meant to be filled with the nonzero rule.
pub fn stroke(lines: &[Polyline], style: &StrokeStyle, tolerance: f64) -> Vec<Vec<Point>> {
    let half = style.width.abs() / 2.0;
    let mut polygons = Vec::new();
    if half <= 0.0 {
        return polygons;
    }

    for line in dash(lines, &style.dash) {
        let mut points = line.points.clone();
        points.dedup_by(|a, b| (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9);
        if line.closed && points.len() > 2 && points.first() == points.last() {
            points.pop();
        }

        if points.len() == 1 {
            let p = points[0];
            match style.cap {
                LineCap::Round => polygons.push(circle(p, half, tolerance)),
                LineCap::Square => polygons.push(vec![
                    (p.0 - half, p.1 - half),
                    (p.0 + half, p.1 - half),
                    (p.0 + half, p.1 + half),
                    (p.0 - half, p.1 + half),
                ]),
                LineCap::Butt => {}
            }
            continue;
        }

        let closed = line.closed && points.len() > 2;
        let count = points.len();
        let segments = if closed { count } else { count - 1 };
        for i in 0..segments {
            let a = points[i];
            let b = points[(i + 1) % count];
            let n = normal(a, b, half);
            polygons.push(vec![
                (a.0 + n.0, a.1 + n.1),
                (b.0 + n.0, b.1 + n.1),
                (b.0 - n.0, b.1 - n.1),
                (a.0 - n.0, a.1 - n.1),
            ]);
        }

        let joints: Vec<usize> = if closed {
            (0..count).collect()
        } else {
            (1..count - 1).collect()
        };
        for i in joints {
            let prev = points[(i + count - 1) % count];
            let p = points[i];
            let next = points[(i + 1) % count];
            if let Some(join) = join(prev, p, next, half, style, tolerance) {
                polygons.push(join);
            }
        }

        if !closed {
            polygons.extend(cap(points[1], points[0], half, style.cap, tolerance));
            polygons.extend(cap(points[count - 2], points[count - 1], half, style.cap, tolerance));
        }
    }

    for polygon in &mut polygons {
        if signed_area(polygon) < 0.0 {
            polygon.reverse();
        }
    }
    polygons
}

/// Left normal of `a → b` scaled to `length`.
fn normal(a: Point, b: Point, length: f64) -> Point {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = dx.hypot(dy);
    if len == 0.0 {
        return (0.0, 0.0);
    }
    (-dy / len * length, dx / len * length)
}

fn join(prev: Point, p: Point, next: Point, half: f64, style: &StrokeStyle, tolerance: f64) -> Option<Vec<Point>> {
    let n1 = normal(prev, p, half);
    let n2 = normal(p, next, half);
    let (d1, d2) = ((p.0 - prev.0, p.1 - prev.1), (next.0 - p.0, next.1 - p.1));
    let cross = d1.0 * d2.1 - d1.1 * d2.0;
    if cross.abs() < 1e-12 && d1.0 * d2.0 + d1.1 * d2.1 >= 0.0 {
        return None;
    }
    if style.join == LineJoin::Round {
        return Some(circle(p, half, tolerance));
    }

    // The outer side of a left turn is on the right.
    let sign = if cross > 0.0 { -1.0 } else { 1.0 };
    let o1 = (n1.0 * sign, n1.1 * sign);
    let o2 = (n2.0 * sign, n2.1 * sign);
    let a = (p.0 + o1.0, p.1 + o1.1);
    let b = (p.0 + o2.0, p.1 + o2.1);

    if style.join == LineJoin::Miter {
        let (mx, my) = (o1.0 + o2.0, o1.1 + o2.1);
        let m_len = mx.hypot(my);
        if m_len > 1e-12 {
            let (ux, uy) = (mx / m_len, my / m_len);
            let cos_half = (ux * o1.0 + uy * o1.1) / half;
            if cos_half > 1e-9 && 1.0 / cos_half <= style.miter_limit {
                let reach = half / cos_half;
                return Some(vec![p, a, (p.0 + ux * reach, p.1 + uy * reach), b]);
            }
        }
    }
    Some(vec![p, a, b])
}

fn cap(from: Point, end: Point, half: f64, cap: LineCap, tolerance: f64) -> Option<Vec<Point>> {
    match cap {
        LineCap::Butt => None,
        LineCap::Round => Some(circle(end, half, tolerance)),
        LineCap::Square => {
            let (dx, dy) = (end.0 - from.0, end.1 - from.1);
            let len = dx.hypot(dy);
            if len == 0.0 {
                return None;
            }
            let d = (dx / len * half, dy / len * half);
            let n = normal(from, end, half);
            Some(vec![
                (end.0 + n.0, end.1 + n.1),
                (end.0 + n.0 + d.0, end.1 + n.1 + d.1),
                (end.0 - n.0 + d.0, end.1 - n.1 + d.1),
                (end.0 - n.0, end.1 - n.1),
            ])
        }
    }
}

pub fn circle(center: Point, radius: f64, tolerance: f64) -> Vec<Point> {
    let ratio = (1.0 - tolerance / radius).clamp(-1.0, 1.0);
    let steps = if ratio <= -1.0 {
        8
    } else {
        ((PI / ratio.acos()).ceil() as usize).clamp(8, 256)
    };
    (0..steps)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / steps as f64;
            (center.0 + radius * angle.cos(), center.1 + radius * angle.sin())
        })
        .collect()
}

pub fn signed_area(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let (a, b) = (polygon[i], polygon[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum::<f64>()
        / 2.0
}
