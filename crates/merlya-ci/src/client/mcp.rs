//! MCP client strategy: contract-only stub.
//!
//! The spec scopes a live MCP transport out of this module's Non-goals;
//! this exists so [`crate::adapter::AdapterCore`] can register an MCP
//! strategy alongside [`super::cli::CLIClient`] and have callers fail
//! with a clear [`CIError::NoAvailableClient`] rather than a missing
//! variant, once a real transport is wired in.

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{CIClient, CIOperation};
use crate::error::{CIError, Result};

pub struct MCPClient {
    server_name: String,
}

impl MCPClient {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
        }
    }
}

#[async_trait]
impl CIClient for MCPClient {
    fn name(&self) -> &'static str {
        "mcp"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn execute(&self, _operation: CIOperation, _params: &[(&str, &str)]) -> Result<Value> {
        Err(CIError::NoAvailableClient(self.server_name.clone()))
    }
}
