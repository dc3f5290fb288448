//! Page tree walk with attribute inheritance.

use std::collections::HashSet;

use super::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};

/// Upper bound on nodes visited in one walk. Shared subtrees are walked once
/// per parent, so a small file could otherwise expand without limit.
const MAX_TREE_VISITS: usize = 1 << 24;

/// Resource categories merged key by key down the tree.
const RESOURCE_CATEGORIES: &[&str] = &[
    "Font",
    "XObject",
    "ExtGState",
    "ColorSpace",
    "Pattern",
    "Shading",
    "Properties",
];

/// An axis-aligned rectangle in default user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    /// US Letter, used when no MediaBox is found.
    pub const LETTER: Rect = Rect {
        x0: 0.0,
        y0: 0.0,
        x1: 612.0,
        y1: 792.0,
    };

    /// Builds a rectangle from any two opposite corners.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_object(object: &Object) -> Option<Self> {
        match object.as_number_array()?.as_slice() {
            [a, b, c, d] => Some(Rect::new(*a, *b, *c, *d)),
            _ => None,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            number(self.x0),
            number(self.y0),
            number(self.x1),
            number(self.y1),
        ])
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        (x0 < x1 && y0 < y1).then_some(Rect { x0, y0, x1, y1 })
    }
}

fn number(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value)
    }
}

/// A leaf of the page tree with inherited attributes applied.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position in document order.
    pub number: u32,
    pub id: ObjectId,
    /// Effective resources: inherited categories merged, child entries winning.
    pub resources: Dictionary,
    pub contents: Vec<ObjectId>,
    pub media_box: Rect,
    pub crop_box: Option<Rect>,
    /// Normalized to 0, 90, 180 or 270.
    pub rotate: i32,
}

impl Page {
    /// Crop box clipped to the media box, or the media box itself.
    pub fn visible_box(&self) -> Rect {
        self.crop_box
            .and_then(|crop| crop.intersect(&self.media_box))
            .unwrap_or(self.media_box)
    }
}

#[derive(Clone, Default)]
struct Inherited {
    resources: Dictionary,
    media_box: Option<Rect>,
    crop_box: Option<Rect>,
    rotate: Option<i64>,
}

/// Walks the tree below the catalog's `/Pages` in document order.
pub(crate) fn collect_pages(doc: &Document) -> Result<Vec<Page>> {
    let catalog = doc.catalog()?;
    let root = catalog
        .get_reference("Pages")
        .ok_or_else(|| PdfError::MalformedPageTree("catalog has no /Pages reference".to_string()))?;

    let mut pages = Vec::new();
    let mut seen = HashSet::new();
    let mut visits = 0usize;
    // Each entry carries the chain of ancestors from the root down to it.
    let mut stack = vec![(root, Inherited::default(), Vec::new())];

    while let Some((node_id, inherited, ancestors)) = stack.pop() {
        if ancestors.contains(&node_id) {
            return Err(PdfError::MalformedPageTree(format!(
                "node {node_id} is its own ancestor"
            )));
        }
        visits += 1;
        if visits > MAX_TREE_VISITS {
            return Err(PdfError::MalformedPageTree(format!(
                "more than {MAX_TREE_VISITS} nodes reachable from {root}"
            )));
        }
        if !seen.insert(node_id) {
            doc.warn_once(
                node_id,
                format!("Page tree node {node_id} has more than one parent"),
            );
        }
        let node = match doc.get_object(node_id).map(|o| o.as_dict()) {
            Ok(Some(dict)) => dict,
            Ok(None) | Err(_) if node_id == root => {
                return Err(PdfError::MalformedPageTree(format!(
                    "page tree root {node_id} is not a dictionary"
                )))
            }
            _ => {
                doc.warn(format!("Skipping unreadable page tree node {node_id}"));
                continue;
            }
        };

        let attrs = inherit(doc, &inherited, node);
        let kids = node.get("Kids").map(|k| doc.resolve(k));
        let is_leaf = node.is_type("Page")
            || (!node.is_type("Pages")
                && kids.is_none()
                && (node.contains_key("Contents") || node.contains_key("MediaBox")));

        if is_leaf {
            pages.push(make_page(doc, node_id, attrs, pages.len() as u32 + 1));
            continue;
        }

        match kids.and_then(Object::as_array) {
            Some(kids) => {
                let mut path = ancestors;
                path.push(node_id);
                // Reverse so the leftmost kid is processed first.
                for kid in kids.iter().rev() {
                    match kid.as_reference() {
                        Some(kid_id) => stack.push((kid_id, attrs.clone(), path.clone())),
                        None => doc.warn(format!("Ignoring non-reference kid in {node_id}")),
                    }
                }
            }
            None => {
                return Err(PdfError::MalformedPageTree(format!(
                    "node {node_id} is neither a page nor has /Kids"
                )))
            }
        }
    }

    Ok(pages)
}

fn inherit(doc: &Document, parent: &Inherited, node: &Dictionary) -> Inherited {
    let mut attrs = parent.clone();
    if let Some(resources) = node.get("Resources").and_then(|r| doc.resolve(r).as_dict()) {
        attrs.resources = merge_resources(doc, &parent.resources, resources);
    }
    if let Some(rect) = node.get("MediaBox").and_then(|r| Rect::from_object(doc.resolve(r))) {
        attrs.media_box = Some(rect);
    }
    if let Some(rect) = node.get("CropBox").and_then(|r| Rect::from_object(doc.resolve(r))) {
        attrs.crop_box = Some(rect);
    }
    if let Some(rotate) = node.get("Rotate").and_then(|r| doc.resolve(r).as_integer()) {
        attrs.rotate = Some(rotate);
    }
    attrs
}

/// Merges `child` over `parent`: category dictionaries are combined entry by
/// entry, other entries are replaced.
pub fn merge_resources(doc: &Document, parent: &Dictionary, child: &Dictionary) -> Dictionary {
    let mut merged = parent.clone();
    for (key, value) in child.iter() {
        let child_category = doc.resolve(value).as_dict();
        let is_category = RESOURCE_CATEGORIES.contains(&key.as_str());
        match (is_category, child_category, merged.get(key).and_then(|p| doc.resolve(p).as_dict())) {
            (true, Some(child_dict), Some(parent_dict)) => {
                let mut combined = parent_dict.clone();
                for (name, entry) in child_dict.iter() {
                    combined.set(name.clone(), entry.clone());
                }
                merged.set(key.clone(), combined);
            }
            (true, Some(child_dict), None) => merged.set(key.clone(), child_dict.clone()),
            _ => merged.set(key.clone(), value.clone()),
        }
    }
    merged
}

fn make_page(doc: &Document, id: ObjectId, attrs: Inherited, number: u32) -> Page {
    let media_box = attrs.media_box.unwrap_or_else(|| {
        doc.warn(format!("Page {number} has no MediaBox, assuming US Letter"));
        Rect::LETTER
    });
    let rotate = attrs.rotate.unwrap_or(0).rem_euclid(360) as i32 / 90 * 90;

    let contents = doc
        .get_object(id)
        .ok()
        .and_then(|o| o.as_dict())
        .and_then(|d| d.get("Contents"))
        .map(|c| content_ids(doc, c))
        .unwrap_or_default();

    Page {
        number,
        id,
        resources: attrs.resources,
        contents,
        media_box,
        crop_box: attrs.crop_box,
        rotate,
    }
}

fn content_ids(doc: &Document, contents: &Object) -> Vec<ObjectId> {
    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            // An indirect array of content streams.
            Ok(Object::Array(items)) => items.iter().filter_map(Object::as_reference).collect(),
            _ => vec![*id],
        },
        Object::Array(items) => items.iter().filter_map(Object::as_reference).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dict;

    fn reference(number: u32) -> Object {
        Object::Reference(ObjectId::new(number, 0))
    }

    fn leaf(parent: u32) -> Object {
        Object::Dictionary(dict([
            ("Type", Object::name("Page")),
            ("Parent", reference(parent)),
        ]))
    }

    fn pages_node(kids: &[u32]) -> Object {
        Object::Dictionary(dict([
            ("Type", Object::name("Pages")),
            ("Kids", Object::Array(kids.iter().map(|&k| reference(k)).collect())),
            ("Count", kids.len().into()),
        ]))
    }

    /// Catalog 1 pointing at the tree root 2, plus `nodes`.
    fn tree(nodes: Vec<(u32, Object)>) -> Document {
        let mut doc = Document::new();
        doc.set_object(
            ObjectId::new(1, 0),
            Object::Dictionary(dict([
                ("Type", Object::name("Catalog")),
                ("Pages", reference(2)),
            ])),
        );
        for (number, node) in nodes {
            doc.set_object(ObjectId::new(number, 0), node);
        }
        doc.trailer_mut().set("Root", reference(1));
        doc
    }

    #[test]
    fn test_kid_pointing_at_ancestor_is_rejected() {
        let doc = tree(vec![
            (2, pages_node(&[3])),
            (3, pages_node(&[4, 2])),
            (4, leaf(3)),
        ]);
        match collect_pages(&doc) {
            Err(PdfError::MalformedPageTree(message)) => {
                assert!(message.contains("2 0 R"), "{message}")
            }
            other => panic!("expected MalformedPageTree, got {other:?}"),
        }
    }

    #[test]
    fn test_shared_subtree_is_not_a_cycle() {
        // Both intermediate nodes list the same subtree 5.
        let doc = tree(vec![
            (2, pages_node(&[3, 4])),
            (3, pages_node(&[5])),
            (4, pages_node(&[5])),
            (5, pages_node(&[6, 7])),
            (6, leaf(5)),
            (7, leaf(5)),
        ]);
        let pages = collect_pages(&doc).unwrap();
        let ids: Vec<u32> = pages.iter().map(|p| p.id.number()).collect();
        assert_eq!(ids, vec![6, 7, 6, 7]);
        assert_eq!(
            pages.iter().map(|p| p.number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(doc
            .warnings()
            .iter()
            .any(|w| w == "Page tree node 5 0 R has more than one parent"));
    }

    #[test]
    fn test_rect_normalizes_corners() {
        let rect = Rect::new(612.0, 792.0, 0.0, 0.0);
        assert_eq!(rect, Rect::LETTER);
        assert_eq!(rect.width(), 612.0);
        assert_eq!(rect.height(), 792.0);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 150.0, 150.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(50.0, 50.0, 100.0, 100.0)));
        assert_eq!(a.intersect(&Rect::new(200.0, 200.0, 300.0, 300.0)), None);
    }

    #[test]
    fn test_rect_object_round_trip() {
        let object = Rect::new(0.0, 0.0, 595.5, 842.0).to_object();
        assert_eq!(
            object,
            Object::Array(vec![0.into(), 0.into(), Object::Real(595.5), 842.into()])
        );
        assert_eq!(Rect::from_object(&object), Some(Rect::new(0.0, 0.0, 595.5, 842.0)));
    }
}
