//! Executes page content onto a canvas.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::canvas::{rasterize, Canvas, FillRule, ImageSource, Mask};
use super::fonts::{type3_glyph, type3_resources, FontLibrary, RenderFont};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::graphics::color::ColorSpace;
use crate::graphics::image::{decode_image, decode_inline_image, DecodedImage};
use crate::graphics::matrix::Matrix;
use crate::graphics::path::{stroke, LineCap, LineDashPattern, LineJoin, Path, Point};
use crate::graphics::StrokeStyle;
use crate::objects::{Dictionary, Object, ObjectId};
use crate::parser::content::{ContentOperation, ContentParser, TextElement};
use crate::parser::filters::decode_stream;
use crate::text::font::{FontDecoder, Glyph};

/// Maximum distance between a flattened curve and the true one, in pixels.
const FLATNESS: f64 = 0.2;
/// Nesting limit for form XObjects and Type 3 glyph procedures.
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone)]
struct Paint {
    space: ColorSpace,
    rgb: [u8; 3],
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            space: ColorSpace::DeviceGray,
            rgb: [0, 0, 0],
        }
    }
}

#[derive(Debug, Clone)]
struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scaling: f64,
    leading: f64,
    rise: f64,
    font_size: f64,
    render_mode: i64,
    font: Option<Rc<RenderFont>>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
            font_size: 0.0,
            render_mode: 0,
            font: None,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Paint,
    stroke: Paint,
    fill_alpha: f64,
    stroke_alpha: f64,
    style: StrokeStyle,
    clip: Option<Rc<Mask>>,
    text: TextState,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill: Paint::default(),
            stroke: Paint::default(),
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            style: StrokeStyle::default(),
            clip: None,
            text: TextState::default(),
        }
    }
}

/// Per-stream state that `q`/`Q` does not save.
#[derive(Default)]
struct Frame {
    saved: Vec<GraphicsState>,
    path: Path,
    pending_clip: Option<FillRule>,
    /// Glyph outlines collected by clipping text render modes until `ET`.
    text_clip: Option<Vec<Vec<Point>>>,
}

pub(crate) struct PageRenderer<'a> {
    doc: &'a Document,
    library: &'a FontLibrary,
    anti_alias: bool,
    page: u32,
    pub(crate) canvas: Canvas,
    pub(crate) warnings: Vec<String>,
    reported: HashSet<String>,
    fonts: HashMap<ObjectId, Rc<RenderFont>>,
    fallback: Option<Rc<RenderFont>>,
    forms: Vec<ObjectId>,
}

impl<'a> PageRenderer<'a> {
    pub(crate) fn new(
        doc: &'a Document,
        library: &'a FontLibrary,
        anti_alias: bool,
        page: u32,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            doc,
            library,
            anti_alias,
            page,
            canvas: Canvas::new(width, height),
            warnings: Vec::new(),
            reported: HashSet::new(),
            fonts: HashMap::new(),
            fallback: None,
            forms: Vec::new(),
        }
    }

    /// Draws page content with `base` mapping default user space to pixels.
    pub(crate) fn render(&mut self, content: &[u8], resources: &Dictionary, base: Matrix) -> Result<()> {
        let mut state = GraphicsState::new(base);
        self.run(content, resources, &mut state, 0)
    }

    /// Records a warning once per page.
    fn warn(&mut self, message: String) {
        if self.reported.insert(message.clone()) {
            tracing::warn!("{message}");
            self.warnings.push(message);
        }
    }

    fn run(&mut self, content: &[u8], resources: &Dictionary, state: &mut GraphicsState, depth: usize) -> Result<()> {
        let (operations, error) = ContentParser::parse_partial(content);
        let mut frame = Frame::default();
        for operation in operations {
            self.apply(operation, resources, state, &mut frame, depth)?;
        }
        if let Some(e) = error {
            self.warn(format!(
                "Page {}: malformed content stream, rest of the content skipped: {e}",
                self.page
            ));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        operation: ContentOperation,
        resources: &Dictionary,
        state: &mut GraphicsState,
        frame: &mut Frame,
        depth: usize,
    ) -> Result<()> {
        use ContentOperation as Op;

        match operation {
            Op::SaveGraphicsState => frame.saved.push(state.clone()),
            Op::RestoreGraphicsState => {
                if let Some(previous) = frame.saved.pop() {
                    *state = previous;
                }
            }
            Op::Transform(m) => state.ctm = Matrix::from_array(m).then(&state.ctm),
            Op::SetLineWidth(width) => state.style.width = width,
            Op::SetLineCap(cap) => state.style.cap = LineCap::from_operand(cap),
            Op::SetLineJoin(join) => state.style.join = LineJoin::from_operand(join),
            Op::SetMiterLimit(limit) => state.style.miter_limit = limit,
            Op::SetDashPattern(array, phase) => state.style.dash = LineDashPattern::new(array, phase),
            Op::SetGraphicsState(name) => self.ext_gstate(&name, resources, state),

            Op::MoveTo(x, y) => frame.path.move_to(x, y),
            Op::LineTo(x, y) => frame.path.line_to(x, y),
            Op::CurveTo([x1, y1, x2, y2, x3, y3]) => frame.path.curve_to((x1, y1), (x2, y2), (x3, y3)),
            Op::CurveToV([x2, y2, x3, y3]) => frame.path.curve_to_v((x2, y2), (x3, y3)),
            Op::CurveToY([x1, y1, x3, y3]) => frame.path.curve_to_y((x1, y1), (x3, y3)),
            Op::ClosePath => frame.path.close(),
            Op::Rectangle(x, y, w, h) => frame.path.rect(x, y, w, h),

            Op::Stroke => self.paint(frame, state, None, true, false),
            Op::CloseStroke => self.paint(frame, state, None, true, true),
            Op::Fill => self.paint(frame, state, Some(FillRule::NonZero), false, false),
            Op::FillEvenOdd => self.paint(frame, state, Some(FillRule::EvenOdd), false, false),
            Op::FillStroke => self.paint(frame, state, Some(FillRule::NonZero), true, false),
            Op::FillStrokeEvenOdd => self.paint(frame, state, Some(FillRule::EvenOdd), true, false),
            Op::CloseFillStroke => self.paint(frame, state, Some(FillRule::NonZero), true, true),
            Op::CloseFillStrokeEvenOdd => self.paint(frame, state, Some(FillRule::EvenOdd), true, true),
            Op::EndPath => self.paint(frame, state, None, false, false),
            Op::Clip => frame.pending_clip = Some(FillRule::NonZero),
            Op::ClipEvenOdd => frame.pending_clip = Some(FillRule::EvenOdd),

            Op::SetStrokingColorSpace(name) => {
                let space = self.color_space(&name, resources)?;
                state.stroke = self.select_space(space);
            }
            Op::SetNonStrokingColorSpace(name) => {
                let space = self.color_space(&name, resources)?;
                state.fill = self.select_space(space);
            }
            Op::SetStrokingColor(components, pattern) => {
                let rgb = self.color(&state.stroke.space, &components, pattern.is_some());
                state.stroke.rgb = rgb;
            }
            Op::SetNonStrokingColor(components, pattern) => {
                let rgb = self.color(&state.fill.space, &components, pattern.is_some());
                state.fill.rgb = rgb;
            }
            Op::SetStrokingGray(g) => state.stroke = device(ColorSpace::DeviceGray, &[g]),
            Op::SetNonStrokingGray(g) => state.fill = device(ColorSpace::DeviceGray, &[g]),
            Op::SetStrokingRGB(r, g, b) => state.stroke = device(ColorSpace::DeviceRGB, &[r, g, b]),
            Op::SetNonStrokingRGB(r, g, b) => state.fill = device(ColorSpace::DeviceRGB, &[r, g, b]),
            Op::SetStrokingCMYK(c, m, y, k) => {
                state.stroke = device(ColorSpace::DeviceCMYK, &[c, m, y, k])
            }
            Op::SetNonStrokingCMYK(c, m, y, k) => {
                state.fill = device(ColorSpace::DeviceCMYK, &[c, m, y, k])
            }
            Op::ShadingFill(name) => {
                self.warn(format!("Page {}: shading /{name} is not rendered", self.page));
            }

            Op::BeginText => {
                state.text.matrix = Matrix::IDENTITY;
                state.text.line_matrix = Matrix::IDENTITY;
            }
            Op::EndText => {
                if let Some(polygons) = frame.text_clip.take() {
                    let coverage = self.coverage(&polygons, FillRule::NonZero);
                    self.intersect_clip(state, coverage);
                }
            }
            Op::SetCharSpacing(value) => state.text.char_spacing = value,
            Op::SetWordSpacing(value) => state.text.word_spacing = value,
            Op::SetHorizontalScaling(value) => state.text.horizontal_scaling = value / 100.0,
            Op::SetLeading(value) => state.text.leading = value,
            Op::SetTextRise(value) => state.text.rise = value,
            Op::SetTextRenderMode(mode) => state.text.render_mode = mode,
            Op::SetFont(name, size) => {
                state.text.font_size = size;
                state.text.font = Some(self.font(resources, &name));
            }
            Op::MoveText(tx, ty) => move_line(&mut state.text, tx, ty),
            Op::MoveTextSetLeading(tx, ty) => {
                state.text.leading = -ty;
                move_line(&mut state.text, tx, ty);
            }
            Op::SetTextMatrix(m) => {
                state.text.matrix = Matrix::from_array(m);
                state.text.line_matrix = state.text.matrix;
            }
            Op::NextLine => {
                let leading = state.text.leading;
                move_line(&mut state.text, 0.0, -leading);
            }
            Op::ShowText(bytes) => {
                self.show_text(state, &[TextElement::Text(bytes)], resources, frame, depth)?
            }
            Op::ShowTextArray(elements) => self.show_text(state, &elements, resources, frame, depth)?,
            Op::NextLineShowText(bytes) => {
                let leading = state.text.leading;
                move_line(&mut state.text, 0.0, -leading);
                self.show_text(state, &[TextElement::Text(bytes)], resources, frame, depth)?;
            }
            Op::SetSpacingNextLineShowText(word, character, bytes) => {
                state.text.word_spacing = word;
                state.text.char_spacing = character;
                let leading = state.text.leading;
                move_line(&mut state.text, 0.0, -leading);
                self.show_text(state, &[TextElement::Text(bytes)], resources, frame, depth)?;
            }

            Op::InlineImage { dict, data } => {
                match decode_inline_image(self.doc, &dict, &data, Some(resources)) {
                    Ok(image) => self.draw_image(&image, state, "inline image"),
                    Err(e @ PdfError::UnsupportedColorSpace(_)) => return Err(e),
                    Err(e) => self.warn(format!("Page {}: inline image skipped: {e}", self.page)),
                }
            }
            Op::PaintXObject(name) => self.paint_xobject(&name, resources, state, depth)?,
            _ => {}
        }
        Ok(())
    }

    fn color_space(&mut self, name: &str, resources: &Dictionary) -> Result<ColorSpace> {
        match ColorSpace::from_name(self.doc, name, Some(resources)) {
            Ok(space) => Ok(space),
            Err(e @ PdfError::UnsupportedColorSpace(_)) => Err(e),
            Err(e) => {
                self.warn(format!("Page {}: {e}, using DeviceGray", self.page));
                Ok(ColorSpace::DeviceGray)
            }
        }
    }

    fn select_space(&mut self, space: ColorSpace) -> Paint {
        match &space {
            ColorSpace::Separation { name, tint: None, .. } => self.warn(format!(
                "Page {}: separation colour /{name} approximated by its tint",
                self.page
            )),
            ColorSpace::Pattern => self.warn(format!(
                "Page {}: pattern fills approximated by a neutral colour",
                self.page
            )),
            _ => {}
        }
        let rgb = space.to_color(&space.initial_color()).to_rgb8();
        Paint { space, rgb }
    }

    fn color(&mut self, space: &ColorSpace, components: &[f64], pattern: bool) -> [u8; 3] {
        if pattern || *space == ColorSpace::Pattern {
            self.warn(format!(
                "Page {}: pattern fills approximated by a neutral colour",
                self.page
            ));
            return ColorSpace::Pattern.to_color(&[]).to_rgb8();
        }
        space.to_color(components).to_rgb8()
    }

    fn ext_gstate(&mut self, name: &str, resources: &Dictionary, state: &mut GraphicsState) {
        let doc = self.doc;
        let Some(gs) = doc
            .dict_get(resources, "ExtGState")
            .and_then(|states| doc.resolve_dict(states))
            .and_then(|states| doc.dict_get(states, name))
            .and_then(|gs| doc.resolve_dict(gs))
        else {
            self.warn(format!("Page {}: graphics state /{name} not found", self.page));
            return;
        };

        let number = |key: &str| doc.dict_get(gs, key).and_then(Object::as_number);
        if let Some(width) = number("LW") {
            state.style.width = width;
        }
        if let Some(cap) = number("LC") {
            state.style.cap = LineCap::from_operand(cap as i64);
        }
        if let Some(join) = number("LJ") {
            state.style.join = LineJoin::from_operand(join as i64);
        }
        if let Some(limit) = number("ML") {
            state.style.miter_limit = limit;
        }
        if let Some(alpha) = number("CA") {
            state.stroke_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(alpha) = number("ca") {
            state.fill_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(dash) = doc.dict_get(gs, "D").and_then(Object::as_array) {
            let array = dash
                .first()
                .map(|a| doc.resolve(a))
                .and_then(Object::as_number_array)
                .unwrap_or_default();
            let phase = dash.get(1).and_then(|p| doc.resolve(p).as_number()).unwrap_or(0.0);
            state.style.dash = LineDashPattern::new(array, phase);
        }
        if let Some(font) = doc.dict_get(gs, "Font").and_then(Object::as_array) {
            if let (Some(font_ref), Some(size)) = (
                font.first().and_then(Object::as_reference),
                font.get(1).and_then(|s| doc.resolve(s).as_number()),
            ) {
                state.text.font_size = size;
                state.text.font = Some(self.font_by_id(font_ref));
            }
        }
        if doc
            .dict_get(gs, "SMask")
            .is_some_and(|mask| mask.as_name() != Some("None"))
        {
            self.warn(format!("Page {}: soft masks in graphics states are ignored", self.page));
        }
    }

    fn paint(
        &mut self,
        frame: &mut Frame,
        state: &mut GraphicsState,
        fill: Option<FillRule>,
        stroke: bool,
        close: bool,
    ) {
        if close {
            frame.path.close();
        }
        let path = std::mem::take(&mut frame.path);
        if let Some(rule) = fill {
            self.fill_path(&path, state, rule);
        }
        if stroke {
            self.stroke_path(&path, state);
        }
        if let Some(rule) = frame.pending_clip.take() {
            let coverage = self.device_polygons(&path, &state.ctm);
            let coverage = self.coverage(&coverage, rule);
            self.intersect_clip(state, coverage);
        }
    }

    fn device_polygons(&self, path: &Path, ctm: &Matrix) -> Vec<Vec<Point>> {
        path.transform(ctm)
            .flatten(FLATNESS)
            .into_iter()
            .map(|line| line.points)
            .collect()
    }

    fn coverage(&self, polygons: &[Vec<Point>], rule: FillRule) -> Option<super::canvas::Coverage> {
        rasterize(polygons, self.canvas.width, self.canvas.height, rule, self.anti_alias)
    }

    fn intersect_clip(&self, state: &mut GraphicsState, coverage: Option<super::canvas::Coverage>) {
        let mask = match &state.clip {
            Some(clip) => clip.intersect(coverage.as_ref()),
            None => Mask::from_coverage(coverage.as_ref(), self.canvas.width, self.canvas.height),
        };
        state.clip = Some(Rc::new(mask));
    }

    fn fill_path(&mut self, path: &Path, state: &GraphicsState, rule: FillRule) {
        let polygons = self.device_polygons(path, &state.ctm);
        if let Some(coverage) = self.coverage(&polygons, rule) {
            self.canvas
                .fill(&coverage, state.fill.rgb, state.fill_alpha, state.clip.as_deref());
        }
    }

    fn stroke_path(&mut self, path: &Path, state: &GraphicsState) {
        let scale = state.ctm.mean_scale();
        if scale < 1e-9 {
            return;
        }
        let tolerance = FLATNESS / scale;
        // Thinnest lines are one device pixel wide.
        let mut style = state.style.clone();
        style.width = style.width.abs().max(1.0 / scale);

        let lines = path.flatten(tolerance);
        let polygons: Vec<Vec<Point>> = stroke(&lines, &style, tolerance)
            .into_iter()
            .map(|polygon| {
                polygon
                    .into_iter()
                    .map(|(x, y)| state.ctm.apply(x, y))
                    .collect()
            })
            .collect();
        if let Some(coverage) = self.coverage(&polygons, FillRule::NonZero) {
            self.canvas
                .fill(&coverage, state.stroke.rgb, state.stroke_alpha, state.clip.as_deref());
        }
    }

    fn font(&mut self, resources: &Dictionary, name: &str) -> Rc<RenderFont> {
        let doc = self.doc;
        let entry = doc
            .dict_get(resources, "Font")
            .and_then(|fonts| doc.resolve_dict(fonts))
            .and_then(|fonts| fonts.get(name));
        match entry {
            Some(Object::Reference(id)) => self.font_by_id(*id),
            Some(direct) => match doc.resolve_dict(direct) {
                Some(dict) => self.prepare_font(FontDecoder::load(doc, dict)),
                None => self.fallback_font(name),
            },
            None => self.fallback_font(name),
        }
    }

    fn font_by_id(&mut self, id: ObjectId) -> Rc<RenderFont> {
        if let Some(font) = self.fonts.get(&id) {
            return Rc::clone(font);
        }
        let Some(dict) = self.doc.get_dict(id) else {
            return self.fallback_font(&id.to_string());
        };
        let font = self.prepare_font(FontDecoder::load(self.doc, dict));
        self.fonts.insert(id, Rc::clone(&font));
        font
    }

    fn prepare_font(&mut self, decoder: FontDecoder) -> Rc<RenderFont> {
        let (font, warning) = RenderFont::load(self.doc, decoder, self.library);
        if let Some(warning) = warning {
            self.warn(format!("Page {}: {warning}", self.page));
        }
        Rc::new(font)
    }

    fn fallback_font(&mut self, name: &str) -> Rc<RenderFont> {
        self.warn(format!(
            "Page {}: font /{name} not found, using a Helvetica substitute",
            self.page
        ));
        if let Some(font) = &self.fallback {
            return Rc::clone(font);
        }
        let font = self.prepare_font(FontDecoder::fallback());
        self.fallback = Some(Rc::clone(&font));
        font
    }

    fn show_text(
        &mut self,
        state: &mut GraphicsState,
        elements: &[TextElement],
        resources: &Dictionary,
        frame: &mut Frame,
        depth: usize,
    ) -> Result<()> {
        let font = match state.text.font.clone() {
            Some(font) => font,
            None => {
                let font = self.fallback_font("(none)");
                state.text.font = Some(Rc::clone(&font));
                font
            }
        };
        let size = state.text.font_size;
        let scaling = state.text.horizontal_scaling;
        let mode = state.text.render_mode;
        let vertical = font.decoder.is_vertical();
        if mode >= 4 && frame.text_clip.is_none() {
            frame.text_clip = Some(Vec::new());
        }

        for element in elements {
            match element {
                TextElement::Text(bytes) => {
                    for glyph in font.decoder.decode(bytes) {
                        if mode != 3 {
                            let trm = Matrix::new(size * scaling, 0.0, 0.0, size, 0.0, state.text.rise)
                                .then(&state.text.matrix);
                            self.draw_glyph(&font, &glyph, &trm, state, resources, frame, depth)?;
                        }
                        let spacing = state.text.char_spacing
                            + if glyph.is_space {
                                state.text.word_spacing
                            } else {
                                0.0
                            };
                        if vertical {
                            advance(&mut state.text, 0.0, -size + spacing);
                        } else {
                            advance(&mut state.text, (glyph.width * size + spacing) * scaling, 0.0);
                        }
                    }
                }
                TextElement::Spacing(adjustment) => {
                    let gap = -adjustment / 1000.0 * size;
                    if vertical {
                        advance(&mut state.text, 0.0, -gap);
                    } else {
                        advance(&mut state.text, gap * scaling, 0.0);
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_glyph(
        &mut self,
        font: &RenderFont,
        glyph: &Glyph,
        trm: &Matrix,
        state: &GraphicsState,
        resources: &Dictionary,
        frame: &mut Frame,
        depth: usize,
    ) -> Result<()> {
        if font.is_type3() {
            if depth >= MAX_DEPTH {
                return Ok(());
            }
            let Some((content, font_matrix)) = type3_glyph(self.doc, font, glyph) else {
                return Ok(());
            };
            let glyph_resources = type3_resources(self.doc, font)
                .cloned()
                .unwrap_or_else(|| resources.clone());
            let mut glyph_state = state.clone();
            glyph_state.ctm = font_matrix.then(trm).then(&state.ctm);
            glyph_state.text = TextState::default();
            return self.run(&content, &glyph_resources, &mut glyph_state, depth + 1);
        }

        let Some((outline, stretch)) = font.outline(glyph) else {
            return Ok(());
        };
        let path = outline.transform(&Matrix::scale(stretch, 1.0).then(trm));
        let mode = state.text.render_mode;
        if matches!(mode, 0 | 2 | 4 | 6) {
            self.fill_path(&path, state, FillRule::NonZero);
        }
        if matches!(mode, 1 | 2 | 5 | 6) {
            self.stroke_path(&path, state);
        }
        if mode >= 4 {
            let polygons = self.device_polygons(&path, &state.ctm);
            if let Some(clip) = frame.text_clip.as_mut() {
                clip.extend(polygons);
            }
        }
        Ok(())
    }

    fn draw_image(&mut self, image: &DecodedImage, state: &GraphicsState, label: &str) {
        if image.truncated {
            self.warn(format!(
                "Page {}: {label} data is shorter than its dimensions, padded",
                self.page
            ));
        }
        let rgb = if image.is_stencil { Vec::new() } else { image.to_rgb() };
        let source = ImageSource {
            width: image.width as usize,
            height: image.height as usize,
            rgb: &rgb,
            alpha: image.alpha.as_deref(),
            stencil_color: image.is_stencil.then_some(state.fill.rgb),
        };
        self.canvas
            .draw_image(&source, &state.ctm, state.fill_alpha, state.clip.as_deref());
    }

    fn paint_xobject(
        &mut self,
        name: &str,
        resources: &Dictionary,
        state: &GraphicsState,
        depth: usize,
    ) -> Result<()> {
        let doc = self.doc;
        let Some(entry) = doc
            .dict_get(resources, "XObject")
            .and_then(|xobjects| doc.resolve_dict(xobjects))
            .and_then(|xobjects| xobjects.get(name))
        else {
            self.warn(format!("Page {}: XObject /{name} not found", self.page));
            return Ok(());
        };
        let Some(stream) = doc.resolve(entry).as_stream() else {
            return Ok(());
        };

        match stream.dict.get_name("Subtype") {
            Some("Image") => {
                match decode_image(doc, stream, Some(resources)) {
                    Ok(image) => self.draw_image(&image, state, &format!("image /{name}")),
                    Err(e @ PdfError::UnsupportedColorSpace(_)) => return Err(e),
                    Err(e) => self.warn(format!("Page {}: image /{name} skipped: {e}", self.page)),
                }
                Ok(())
            }
            Some("Form") => {
                let id = entry.as_reference();
                if depth >= MAX_DEPTH || id.is_some_and(|id| self.forms.contains(&id)) {
                    self.warn(format!(
                        "Page {}: form XObject /{name} nested too deeply or recursive, skipped",
                        self.page
                    ));
                    return Ok(());
                }
                let content = match decode_stream(stream) {
                    Ok(content) => content,
                    Err(e) => {
                        self.warn(format!(
                            "Page {}: form XObject /{name} could not be decoded: {e}",
                            self.page
                        ));
                        return Ok(());
                    }
                };
                let form_resources = doc
                    .dict_get(&stream.dict, "Resources")
                    .and_then(|r| doc.resolve_dict(r))
                    .unwrap_or(resources)
                    .clone();
                let matrix = doc
                    .dict_get(&stream.dict, "Matrix")
                    .and_then(Object::as_number_array)
                    .and_then(|m| Matrix::from_slice(&m))
                    .unwrap_or_default();

                let mut form_state = state.clone();
                form_state.ctm = matrix.then(&state.ctm);
                if let Some(bbox) = doc
                    .dict_get(&stream.dict, "BBox")
                    .and_then(crate::document::Rect::from_object)
                {
                    let mut clip = Path::new();
                    clip.rect(bbox.x0, bbox.y0, bbox.width(), bbox.height());
                    let polygons = self.device_polygons(&clip, &form_state.ctm);
                    let coverage = self.coverage(&polygons, FillRule::NonZero);
                    self.intersect_clip(&mut form_state, coverage);
                }

                if let Some(id) = id {
                    self.forms.push(id);
                }
                let result = self.run(&content, &form_resources, &mut form_state, depth + 1);
                if id.is_some() {
                    self.forms.pop();
                }
                result
            }
            _ => Ok(()),
        }
    }
}

fn device(space: ColorSpace, components: &[f64]) -> Paint {
    let rgb = space.to_color(components).to_rgb8();
    Paint { space, rgb }
}

fn move_line(text: &mut TextState, tx: f64, ty: f64) {
    text.line_matrix = Matrix::translate(tx, ty).then(&text.line_matrix);
    text.matrix = text.line_matrix;
}

fn advance(text: &mut TextState, tx: f64, ty: f64) {
    text.matrix = Matrix::translate(tx, ty).then(&text.matrix);
}
