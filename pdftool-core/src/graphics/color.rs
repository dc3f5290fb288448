//! Colour spaces and conversion to device RGB.

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};

/// Maximum nesting of base colour spaces (`Indexed` over `ICCBased` over ...).
const MAX_COLOR_SPACE_DEPTH: usize = 8;

/// A device colour after conversion, components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Rgb(f64, f64, f64),
    Gray(f64),
    Cmyk(f64, f64, f64, f64),
}

impl Color {
    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Color::Rgb(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
    }

    pub fn gray(value: f64) -> Self {
        Color::Gray(value.clamp(0.0, 1.0))
    }

    pub fn cmyk(c: f64, m: f64, y: f64, k: f64) -> Self {
        Color::Cmyk(
            c.clamp(0.0, 1.0),
            m.clamp(0.0, 1.0),
            y.clamp(0.0, 1.0),
            k.clamp(0.0, 1.0),
        )
    }

    pub fn black() -> Self {
        Color::Gray(0.0)
    }

    pub fn white() -> Self {
        Color::Gray(1.0)
    }

    /// Naive CMYK conversion without a profile.
    pub fn to_rgb(&self) -> [f64; 3] {
        match *self {
            Color::Rgb(r, g, b) => [r, g, b],
            Color::Gray(v) => [v, v, v],
            Color::Cmyk(c, m, y, k) => [
                (1.0 - c) * (1.0 - k),
                (1.0 - m) * (1.0 - k),
                (1.0 - y) * (1.0 - k),
            ],
        }
    }

    pub fn to_rgb8(&self) -> [u8; 3] {
        let [r, g, b] = self.to_rgb();
        [to_byte(r), to_byte(g), to_byte(b)]
    }
}

fn to_byte(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Exponential interpolation function (FunctionType 2), the usual tint
/// transform of spot colours.
#[derive(Debug, Clone, PartialEq)]
pub struct TintFunction {
    c0: Vec<f64>,
    c1: Vec<f64>,
    exponent: f64,
}

impl TintFunction {
    fn from_object(doc: &Document, object: &Object) -> Option<Self> {
        let dict = match doc.resolve(object) {
            Object::Dictionary(dict) => dict,
            Object::Stream(stream) => &stream.dict,
            _ => return None,
        };
        if dict.get_integer("FunctionType") != Some(2) {
            return None;
        }
        let numbers = |key: &str, default: Vec<f64>| {
            doc.dict_get(dict, key)
                .and_then(Object::as_number_array)
                .unwrap_or(default)
        };
        let c0 = numbers("C0", vec![0.0]);
        let c1 = numbers("C1", vec![1.0]);
        if c0.len() != c1.len() {
            return None;
        }
        Some(Self {
            c0,
            c1,
            exponent: doc.dict_get(dict, "N").and_then(Object::as_number)?,
        })
    }

    pub fn eval(&self, x: f64) -> Vec<f64> {
        let t = x.clamp(0.0, 1.0).powf(self.exponent);
        self.c0
            .iter()
            .zip(&self.c1)
            .map(|(a, b)| a + t * (b - a))
            .collect()
    }
}

/// A colour space as used by fill/stroke colours and images.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    CalGray,
    CalRGB,
    Lab {
        white: [f64; 3],
        range: [f64; 4],
    },
    /// Treated as the device space with `components` channels.
    ICCBased {
        components: usize,
    },
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
    Separation {
        name: String,
        alternate: Box<ColorSpace>,
        tint: Option<TintFunction>,
    },
    Pattern,
}

impl ColorSpace {
    /// Resolves a colour space operand or `/ColorSpace` entry. Names that are
    /// not device families are looked up in the resources' `/ColorSpace`.
    pub fn from_object(
        doc: &Document,
        object: &Object,
        resources: Option<&Dictionary>,
    ) -> Result<ColorSpace> {
        Self::parse(doc, object, resources, 0)
    }

    /// Resolves a colour space by operand name (`cs`/`CS`).
    pub fn from_name(doc: &Document, name: &str, resources: Option<&Dictionary>) -> Result<ColorSpace> {
        Self::parse(doc, &Object::Name(name.to_string()), resources, 0)
    }

    fn parse(
        doc: &Document,
        object: &Object,
        resources: Option<&Dictionary>,
        depth: usize,
    ) -> Result<ColorSpace> {
        if depth > MAX_COLOR_SPACE_DEPTH {
            return Err(PdfError::StructuralCorruption(
                "Colour space nesting too deep".to_string(),
            ));
        }
        match doc.resolve(object) {
            Object::Name(name) => {
                if let Some(space) = Self::family(name) {
                    return Ok(space);
                }
                if matches!(name.as_str(), "DeviceN" | "NChannel") {
                    return Err(PdfError::UnsupportedColorSpace(name.clone()));
                }
                let named = resources
                    .and_then(|r| doc.dict_get(r, "ColorSpace"))
                    .and_then(|spaces| doc.resolve_dict(spaces))
                    .and_then(|spaces| doc.dict_get(spaces, name))
                    .ok_or_else(|| {
                        PdfError::StructuralCorruption(format!("Unknown colour space /{name}"))
                    })?;
                Self::parse(doc, named, None, depth + 1)
            }
            Object::Array(items) => Self::parse_array(doc, items, resources, depth),
            other => Err(PdfError::StructuralCorruption(format!(
                "Colour space must be a name or array, found {}",
                other.type_name()
            ))),
        }
    }

    fn family(name: &str) -> Option<ColorSpace> {
        Some(match name {
            "DeviceGray" | "G" | "CalGray" => ColorSpace::DeviceGray,
            "DeviceRGB" | "RGB" | "CalRGB" => ColorSpace::DeviceRGB,
            "DeviceCMYK" | "CMYK" => ColorSpace::DeviceCMYK,
            "Pattern" => ColorSpace::Pattern,
            _ => return None,
        })
    }

    fn parse_array(
        doc: &Document,
        items: &[Object],
        resources: Option<&Dictionary>,
        depth: usize,
    ) -> Result<ColorSpace> {
        let family = items
            .first()
            .map(|f| doc.resolve(f))
            .and_then(Object::as_name)
            .ok_or_else(|| PdfError::StructuralCorruption("Empty colour space array".to_string()))?;
        let param = |index: usize| items.get(index).map(|o| doc.resolve(o));

        match family {
            "DeviceGray" | "G" => Ok(ColorSpace::DeviceGray),
            "DeviceRGB" | "RGB" => Ok(ColorSpace::DeviceRGB),
            "DeviceCMYK" | "CMYK" => Ok(ColorSpace::DeviceCMYK),
            "CalGray" => Ok(ColorSpace::CalGray),
            "CalRGB" => Ok(ColorSpace::CalRGB),
            "Lab" => {
                let dict = param(1).and_then(Object::as_dict);
                let array = |key: &str| {
                    dict.and_then(|d| doc.dict_get(d, key))
                        .and_then(Object::as_number_array)
                };
                let white = match array("WhitePoint").as_deref() {
                    Some([x, y, z]) => [*x, *y, *z],
                    _ => [0.9505, 1.0, 1.089],
                };
                let range = match array("Range").as_deref() {
                    Some([a0, a1, b0, b1]) => [*a0, *a1, *b0, *b1],
                    _ => [-100.0, 100.0, -100.0, 100.0],
                };
                Ok(ColorSpace::Lab { white, range })
            }
            "ICCBased" => {
                let stream = param(1).and_then(Object::as_stream).ok_or_else(|| {
                    PdfError::StructuralCorruption("ICCBased without profile stream".to_string())
                })?;
                let n = doc.dict_get(&stream.dict, "N").and_then(Object::as_integer);
                let components = match n {
                    Some(n @ (1 | 3 | 4)) => n as usize,
                    _ => match doc.dict_get(&stream.dict, "Alternate") {
                        Some(alternate) => {
                            return Self::parse(doc, alternate, resources, depth + 1);
                        }
                        None => {
                            return Err(PdfError::StructuralCorruption(format!(
                                "ICCBased profile with {n:?} components"
                            )))
                        }
                    },
                };
                Ok(ColorSpace::ICCBased { components })
            }
            "Indexed" | "I" => {
                let base = param(1).ok_or_else(|| {
                    PdfError::StructuralCorruption("Indexed without base".to_string())
                })?;
                let base = Self::parse(doc, base, resources, depth + 1)?;
                let hival = param(2)
                    .and_then(Object::as_integer)
                    .unwrap_or(255)
                    .clamp(0, 255) as u8;
                let lookup = match param(3) {
                    Some(Object::String(bytes)) => bytes.clone(),
                    Some(Object::Stream(stream)) => crate::parser::filters::decode_stream(stream)?,
                    _ => Vec::new(),
                };
                Ok(ColorSpace::Indexed {
                    base: Box::new(base),
                    hival,
                    lookup,
                })
            }
            "Separation" => {
                let name = param(1).and_then(Object::as_name).unwrap_or("None").to_string();
                let alternate = match param(2) {
                    Some(alt) => Self::parse(doc, alt, resources, depth + 1)
                        .unwrap_or(ColorSpace::DeviceGray),
                    None => ColorSpace::DeviceGray,
                };
                let tint = param(3)
                    .and_then(|f| TintFunction::from_object(doc, f))
                    .filter(|f| f.c0.len() == alternate.components());
                Ok(ColorSpace::Separation {
                    name,
                    alternate: Box::new(alternate),
                    tint,
                })
            }
            "Pattern" => Ok(ColorSpace::Pattern),
            "DeviceN" | "NChannel" => Err(PdfError::UnsupportedColorSpace(family.to_string())),
            other => Err(PdfError::StructuralCorruption(format!(
                "Unknown colour space family /{other}"
            ))),
        }
    }

    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray
            | ColorSpace::CalGray
            | ColorSpace::Indexed { .. }
            | ColorSpace::Separation { .. }
            | ColorSpace::Pattern => 1,
            ColorSpace::DeviceRGB | ColorSpace::CalRGB | ColorSpace::Lab { .. } => 3,
            ColorSpace::DeviceCMYK => 4,
            ColorSpace::ICCBased { components } => *components,
        }
    }

    /// Colour selected by `cs`/`CS` before any `sc`.
    pub fn initial_color(&self) -> Vec<f64> {
        match self {
            ColorSpace::DeviceCMYK => vec![0.0, 0.0, 0.0, 1.0],
            ColorSpace::ICCBased { components: 4 } => vec![0.0, 0.0, 0.0, 1.0],
            ColorSpace::Separation { .. } => vec![1.0],
            ColorSpace::Lab { .. } => vec![0.0, 0.0, 0.0],
            other => vec![0.0; other.components()],
        }
    }

    /// Default `/Decode` ranges for image samples with `bpc` bits.
    pub fn default_decode(&self, bpc: u8) -> Vec<(f64, f64)> {
        match self {
            ColorSpace::Indexed { .. } => vec![(0.0, ((1u32 << bpc) - 1) as f64)],
            ColorSpace::Lab { range, .. } => {
                vec![(0.0, 100.0), (range[0], range[1]), (range[2], range[3])]
            }
            other => vec![(0.0, 1.0); other.components()],
        }
    }

    /// Separation spaces without an evaluable tint transform are drawn as
    /// gray levels.
    pub fn is_approximated(&self) -> bool {
        matches!(
            self,
            ColorSpace::Separation { tint: None, .. } | ColorSpace::Pattern
        )
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, ColorSpace::Indexed { .. })
    }

    /// Converts colour components (in this space's natural ranges) to a
    /// device colour.
    pub fn to_color(&self, comps: &[f64]) -> Color {
        let c = |i: usize| comps.get(i).copied().unwrap_or(0.0);
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray => Color::gray(c(0)),
            ColorSpace::DeviceRGB | ColorSpace::CalRGB => Color::rgb(c(0), c(1), c(2)),
            ColorSpace::DeviceCMYK => Color::cmyk(c(0), c(1), c(2), c(3)),
            ColorSpace::ICCBased { components } => match components {
                1 => Color::gray(c(0)),
                4 => Color::cmyk(c(0), c(1), c(2), c(3)),
                _ => Color::rgb(c(0), c(1), c(2)),
            },
            ColorSpace::Lab { white, .. } => {
                let [r, g, b] = lab_to_rgb(c(0), c(1), c(2), white);
                Color::rgb(r, g, b)
            }
            ColorSpace::Indexed {
                base,
                hival,
                lookup,
            } => {
                let index = c(0).round().clamp(0.0, f64::from(*hival)) as usize;
                let n = base.components();
                let entry: Vec<f64> = (0..n)
                    .map(|k| lookup.get(index * n + k).copied().unwrap_or(0) as f64 / 255.0)
                    .collect();
                let scaled = match base.as_ref() {
                    ColorSpace::Lab { range, .. } => vec![
                        entry[0] * 100.0,
                        range[0] + entry[1] * (range[1] - range[0]),
                        range[2] + entry[2] * (range[3] - range[2]),
                    ],
                    _ => entry,
                };
                base.to_color(&scaled)
            }
            ColorSpace::Separation {
                alternate, tint, ..
            } => match tint {
                Some(function) => alternate.to_color(&function.eval(c(0))),
                None => Color::gray(1.0 - c(0)),
            },
            ColorSpace::Pattern => Color::gray(0.5),
        }
    }

    /// RGB palette of an indexed space, one entry per index.
    pub fn palette(&self) -> Option<Vec<[u8; 3]>> {
        match self {
            ColorSpace::Indexed { hival, .. } => Some(
                (0..=usize::from(*hival))
                    .map(|i| self.to_color(&[i as f64]).to_rgb8())
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// CIE L*a*b* to sRGB, via XYZ relative to `white`.
fn lab_to_rgb(l: f64, a: f64, b: f64, white: &[f64; 3]) -> [f64; 3] {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let g = |t: f64| {
        if t > 6.0 / 29.0 {
            t * t * t
        } else {
            3.0 * (6.0f64 / 29.0).powi(2) * (t - 4.0 / 29.0)
        }
    };
    let (x, y, z) = (white[0] * g(fx), white[1] * g(fy), white[2] * g(fz));
    let linear = [
        3.2406 * x - 1.5372 * y - 0.4986 * z,
        -0.9689 * x + 1.8758 * y + 0.0415 * z,
        0.0557 * x - 0.2040 * y + 1.0570 * z,
    ];
    linear.map(|v| {
        let v = v.clamp(0.0, 1.0);
        if v <= 0.003_130_8 {
            12.92 * v
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    })
}
