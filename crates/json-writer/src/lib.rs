//! The OData JSON format back-end for the payload writer engine.
//!
//! [`JsonBackend`] implements the engine's hook surface over any
//! `io::Write`, emitting OData JSON: context URLs, `@odata.id` and
//! `@odata.type` metadata, set envelopes with counts and paging links,
//! delta payloads with `@removed` entries and link objects, deferred
//! navigation links, and incrementally-encoded binary and text values.

mod backend;
pub use backend::JsonBackend;

mod emitter;
