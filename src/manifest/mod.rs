//! Agent manifest model, parser, and loader.
//!
//! A manifest declares the HTTP actions an agent exposes and how each one
//! maps to request/response events on the bus. Manifests are read-only
//! after load; the route builder borrows them to synthesize handlers.

mod loader;
mod parser;
mod types;

pub use loader::Loader;
pub use parser::parse;
pub use types::{
    Action, AuthMode, HttpBinding, JwtSettings, Manifest, RequestSpec, ResponseMapping,
    ResponseSpec,
};
