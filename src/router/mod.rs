//! Manifest-driven route synthesis.

mod builder;
mod handler;

pub use builder::RouteBuilder;
