//! Bearer token extraction and JWT verification.

mod extractor;
mod jwt;

pub use extractor::extract_bearer_token;
pub use jwt::{Claims, JwtVerifier};
