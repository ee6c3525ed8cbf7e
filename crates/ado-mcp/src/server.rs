//! MCP server implementation.
//!
//! The server handles the MCP protocol lifecycle:
//! 1. Initialize - exchange capabilities
//! 2. Handle tool calls - execute download management tools
//! 3. Shutdown - return to the caller on EOF so it can clean up

use std::sync::Arc;

use ado_downloads::TempDownloadManager;
use serde_json::Value;

use crate::handlers::ToolHandler;
use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability, ToolsListResult, MCP_VERSION,
};
use crate::transport::{IncomingMessage, StdioTransport};

/// Name reported to clients during initialization.
pub const SERVER_NAME: &str = "ado-mcp";

/// MCP server for ado-mcp-tools.
pub struct McpServer {
    handler: ToolHandler,
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server around a download manager.
    pub fn new(manager: Arc<TempDownloadManager>) -> Self {
        Self {
            handler: ToolHandler::new(manager),
            initialized: false,
        }
    }

    /// Run the server over stdin/stdout until the client disconnects.
    pub async fn run(&mut self) -> ado_core::Result<()> {
        self.serve(StdioTransport::stdio()).await
    }

    /// Run the server over the given transport until EOF.
    pub async fn serve(&mut self, mut transport: StdioTransport) -> ado_core::Result<()> {
        tracing::info!(
            "Starting MCP server, downloads staged in {}",
            self.handler.manager().location().display()
        );

        loop {
            match transport.read_message() {
                Ok(Some(msg)) => {
                    if let Some(resp) = self.handle_message(msg).await {
                        if let Err(e) = transport.write_response(&resp) {
                            tracing::error!("Failed to write response: {}", e);
                            break;
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("EOF received, shutting down");
                    break;
                }
                Err(e) => {
                    tracing::error!("Transport error: {}", e);
                    let error_resp = JsonRpcResponse::error(
                        RequestId::Null,
                        JsonRpcError::parse_error(&e.to_string()),
                    );
                    if transport.write_response(&error_resp).is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("MCP server stopped");
        Ok(())
    }

    /// Handle an incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> Option<JsonRpcResponse> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(req).await),
            IncomingMessage::Notification(notif) => {
                self.handle_notification(&notif.method);
                None
            }
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!("Handling request: {} (id: {:?})", req.method, req.id);

        match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id, req.params),
            "tools/list" => self.handle_tools_list(req.id),
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
            method => {
                tracing::warn!("Unknown method: {}", method);
                JsonRpcResponse::error(req.id, JsonRpcError::method_not_found(method))
            }
        }
    }

    /// Handle notifications (no response).
    fn handle_notification(&mut self, method: &str) {
        match method {
            "initialized" | "notifications/initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                tracing::debug!("Request cancelled by client");
            }
            _ => {
                tracing::debug!("Ignoring notification: {}", method);
            }
        }
    }

    fn handle_initialize(&mut self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        if self.initialized {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request("Server already initialized"),
            );
        }

        if let Some(params) = params {
            match serde_json::from_value::<InitializeParams>(params) {
                Ok(init) => tracing::info!(
                    "Client: {} v{} (protocol: {})",
                    init.client_info.name,
                    init.client_info.version,
                    init.protocol_version
                ),
                Err(e) => tracing::warn!("Failed to parse initialize params: {}", e),
            }
        }

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        JsonRpcResponse::from_result(id, &result)
    }

    fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.handler.available_tools(),
        };
        JsonRpcResponse::from_result(id, &result)
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(&e.to_string()),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
            }
        };

        tracing::info!("Calling tool: {}", params.name);

        let result = self.handler.execute(&params.name, params.arguments).await;
        JsonRpcResponse::from_result(id, &result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcNotification, ToolCallResult, JSONRPC_VERSION};
    use crate::transport::tests::SharedWriter;
    use ado_core::DownloadsConfig;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn server(tmp: &TempDir) -> McpServer {
        let config = DownloadsConfig {
            temp_dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        McpServer::new(Arc::new(TempDownloadManager::with_pid(&config, 5)))
    }

    fn request(id: i64, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Number(id),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_initialize_response() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let resp = server
            .handle_request(request(
                1,
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test-client", "version": "1.0.0"}
                })),
            ))
            .await;

        let result = resp.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert!(server.initialized);
    }

    #[tokio::test]
    async fn test_double_initialize_error() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);
        server.initialized = true;

        let resp = server.handle_initialize(RequestId::Number(1), None);
        assert_eq!(resp.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[test]
    fn test_initialize_with_invalid_params() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let resp =
            server.handle_initialize(RequestId::Number(1), Some(serde_json::json!({"bad": 1})));
        assert!(resp.result.is_some());
        assert!(server.initialized);
    }

    #[test]
    fn test_tools_list() {
        let tmp = TempDir::new().unwrap();
        let server = server(&tmp);

        let resp = server.handle_tools_list(RequestId::Number(1));
        let result: ToolsListResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(result.tools.iter().any(|t| t.name == "list_downloads"));
        assert!(result.tools.iter().any(|t| t.name == "cleanup_downloads"));
        assert!(result.tools.iter().any(|t| t.name == "get_download_location"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let resp = server.handle_request(request(1, "resources/list", None)).await;
        assert_eq!(resp.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_call() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let resp = server
            .handle_request(request(
                2,
                "tools/call",
                Some(serde_json::json!({"name": "get_download_location"})),
            ))
            .await;

        let result: ToolCallResult = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert!(!result.is_error());
        assert!(result.first_text().contains("ado-mcp-server-5"));
    }

    #[tokio::test]
    async fn test_tools_call_missing_params() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let resp = server.handle_request(request(1, "tools/call", None)).await;
        assert_eq!(resp.error.unwrap().code, JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_call_invalid_params() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let resp = server
            .handle_request(request(1, "tools/call", Some(serde_json::json!("nope"))))
            .await;
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let msg = IncomingMessage::Notification(JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        });
        assert!(server.handle_message(msg).await.is_none());
    }

    #[tokio::test]
    async fn test_serve_until_eof() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(&tmp);

        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"0"}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "garbage",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        ]
        .join("\n");

        let writer = SharedWriter::default();
        let transport = StdioTransport::new(
            Box::new(Cursor::new(format!("{}\n", input))),
            Box::new(writer.clone()),
        );
        server.serve(transport).await.unwrap();

        let lines: Vec<Value> = writer
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert_eq!(lines[2]["id"], 2);
    }
}
