//! In-memory PDF object model.
//!
//! Objects never own other indirect objects: links between them are stored as
//! [`Object::Reference`] values and resolved through the owning
//! [`Document`](crate::document::Document).

mod dictionary;
mod primitive;
mod stream;

pub use dictionary::Dictionary;
pub use primitive::{Object, ObjectId};
pub use stream::Stream;
