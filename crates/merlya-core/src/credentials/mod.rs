//! Credential & secret plane: typed variables with dual-resolution, and
//! log redaction independent of the variable store.

pub mod redaction;
pub mod variables;

pub use redaction::redact_sensitive_info;
pub use variables::{extract_credentials_from_prompt, CredentialStore, Variable, VariableKind};
