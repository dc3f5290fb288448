//! Geometry and colour primitives shared by the rasterizer and the compressor.

pub mod color;
pub mod image;
pub mod matrix;
pub mod path;

pub use color::{Color, ColorSpace};
pub use image::{decode_image, decode_inline_image, DecodedImage};
pub use matrix::Matrix;
pub use path::{LineCap, LineDashPattern, LineJoin, Path, StrokeStyle};
