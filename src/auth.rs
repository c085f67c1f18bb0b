//! Typed seam standing in for JWT validation, which is an external
//! collaborator this crate does not implement. A real deployment wires in
//! its own [`AuthValidator`]; this crate ships only a pass-through.

use async_trait::async_trait;

#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn validate(&self, token: &str) -> bool;
}

pub struct NoopValidator;

#[async_trait]
impl AuthValidator for NoopValidator {
    async fn validate(&self, _token: &str) -> bool {
        true
    }
}
