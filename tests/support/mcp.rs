use anyhow::Result;
use google_sheets_mcp::SheetsServer;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, CallToolResult},
    service::{RunningService, ServiceError},
};
use serde_json::Value;

pub fn call_tool(name: &'static str, args: Value) -> CallToolRequestParam {
    CallToolRequestParam {
        name: name.into(),
        arguments: args.as_object().cloned(),
    }
}

/// Serve `server` over an in-memory pipe and return a connected client.
pub async fn connect(server: SheetsServer) -> Result<RunningService<RoleClient, ()>> {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        if let Ok(running) = server.serve(server_io).await {
            let _ = running.waiting().await;
        }
    });
    let client = ().serve(client_io).await?;
    Ok(client)
}

/// Structured payload of a successful tool call.
pub fn structured(result: &CallToolResult) -> Value {
    result
        .structured_content
        .clone()
        .expect("tool returned structured content")
}

/// JSON-RPC error code of a refused tool call, `None` if it succeeded.
pub fn error_code(result: &Result<CallToolResult, ServiceError>) -> Option<i32> {
    match result {
        Err(ServiceError::McpError(error)) => Some(error.code.0),
        _ => None,
    }
}
