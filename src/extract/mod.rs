//! Pure extraction passes over raw content text
//!
//! These parsers never touch the store: they turn a text snapshot into
//! candidate references and tags with byte offsets, and the services
//! reconcile the candidates against persisted state.

pub mod reference;
pub mod tag;

pub use reference::{parse_references, LinkType, ReferenceCandidate};
pub use tag::{
    extract_tags, normalize_tag_name, validate_tag_name, TagCandidate, TagExtractOptions,
    TagNameCheck, TagSyntax,
};
