// quilt-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Stdio and HTTP transports for JSON-RPC 2.0 tool dispatch.
// Purpose: Accept framed MCP requests, build contexts, emit responses.
// Dependencies: axum, tokio, quilt-mcp-ops, serde_json
// ============================================================================

//! ## Overview
//! Two transports serve the same router: a strictly serial Content-Length
//! framed stdio loop and an HTTP endpoint at `/mcp` with health routes at
//! `/health`, `/healthz`, and `/`. Health never consults a backend. The
//! `mcp-protocol-version` header is required on HTTP requests and the
//! `mcp-session-id` header round-trips on every response of a session.
//! Client disconnects cancel the request's token; a panic inside a tool is
//! caught at this boundary and surfaces as `INTERNAL`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::Sse;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use quilt_mcp_config::QuiltMcpConfig;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::RequestContext;
use quilt_mcp_core::TransportKind;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::audit::McpAuditEvent;
use crate::audit::McpAuditEventParams;
use crate::audit::McpAuditSink;
use crate::audit::McpStderrAuditSink;
use crate::telemetry::McpMethod;
use crate::telemetry::McpMetricEvent;
use crate::telemetry::McpMetrics;
use crate::telemetry::McpOutcome;
use crate::telemetry::NoopMetrics;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted request body size.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
/// MCP protocol version advertised by initialize.
const PROTOCOL_VERSION: &str = "2025-06-18";
/// Required protocol version header on HTTP requests.
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
/// Session identifier header.
const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Session id counter for generated identifiers.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// SECTION: Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Resolved configuration.
    config: QuiltMcpConfig,
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Metrics sink.
    metrics: Arc<dyn McpMetrics>,
    /// Audit sink.
    audit: Arc<dyn McpAuditSink>,
}

impl McpServer {
    /// Builds a server from configuration with default observability.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when initialization fails.
    pub async fn from_config(config: QuiltMcpConfig) -> OpsResult<Self> {
        Self::from_config_with_observability(
            config,
            Arc::new(NoopMetrics),
            Arc::new(McpStderrAuditSink),
        )
        .await
    }

    /// Builds a server with custom metrics and audit sinks.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when initialization fails.
    pub async fn from_config_with_observability(
        config: QuiltMcpConfig,
        metrics: Arc<dyn McpMetrics>,
        audit: Arc<dyn McpAuditSink>,
    ) -> OpsResult<Self> {
        config.validate().map_err(OpsError::from)?;
        let router = ToolRouter::new(config.clone()).await?;
        Ok(Self {
            config,
            router,
            metrics,
            audit,
        })
    }

    /// Serves requests on the configured transport until shutdown.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the transport fails.
    pub async fn serve(self) -> OpsResult<()> {
        let state = Arc::new(ServerState {
            router: self.router,
            metrics: self.metrics,
            audit: self.audit,
            transport: self.config.transport,
        });
        match self.config.transport {
            TransportKind::Stdio => serve_stdio(state).await,
            TransportKind::Http => serve_http(state, &self.config.bind).await,
        }
    }
}

/// Shared state for both transports.
struct ServerState {
    /// Tool router.
    router: ToolRouter,
    /// Metrics sink.
    metrics: Arc<dyn McpMetrics>,
    /// Audit sink.
    audit: Arc<dyn McpAuditSink>,
    /// Transport label for health and telemetry.
    transport: TransportKind,
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves framed JSON-RPC over stdin/stdout, strictly serially.
async fn serve_stdio(state: Arc<ServerState>) -> OpsResult<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = tokio::io::stdout();
    loop {
        let bytes = match read_framed(&mut reader).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(()),
            Err(err) => return Err(err),
        };
        let (_, response, _) = process_request(&state, None, &bytes).await;
        let payload = serde_json::to_vec(&response)
            .map_err(|err| OpsError::internal("response serialization failed").with_cause(err.to_string()))?;
        write_framed(&mut writer, &payload).await?;
    }
}

/// Reads one Content-Length framed payload; `None` on clean EOF.
async fn read_framed(
    reader: &mut BufReader<tokio::io::Stdin>,
) -> OpsResult<Option<Vec<u8>>> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|err| transport_error("stdio read failed", &err))?;
        if read == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| OpsError::internal("invalid content length header"))?;
            content_length = Some(parsed);
        }
    }
    let length =
        content_length.ok_or_else(|| OpsError::internal("missing content length header"))?;
    if length > MAX_BODY_BYTES {
        return Err(OpsError::validation("request body too large"));
    }
    let mut buffer = vec![0u8; length];
    reader
        .read_exact(&mut buffer)
        .await
        .map_err(|err| transport_error("stdio read failed", &err))?;
    Ok(Some(buffer))
}

/// Writes one Content-Length framed payload.
async fn write_framed(writer: &mut tokio::io::Stdout, payload: &[u8]) -> OpsResult<()> {
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|err| transport_error("stdio write failed", &err))?;
    writer
        .write_all(payload)
        .await
        .map_err(|err| transport_error("stdio write failed", &err))?;
    writer.flush().await.map_err(|err| transport_error("stdio write failed", &err))
}

fn transport_error(message: &str, err: &dyn std::fmt::Display) -> OpsError {
    OpsError::internal(message).with_cause(err.to_string())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Serves JSON-RPC over HTTP with companion health routes.
async fn serve_http(state: Arc<ServerState>, bind: &str) -> OpsResult<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| OpsError::new(ErrorKind::ConfigInvalid, format!("invalid bind address: {bind}")))?;
    let app = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health))
        .route("/healthz", get(handle_health))
        .route("/", get(handle_health))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| OpsError::internal("http bind failed").with_cause(err.to_string()))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|err| OpsError::internal("http server failed").with_cause(err.to_string()))
}

/// Health handler; proves the process is up without touching backends.
async fn handle_health(
    State(state): State<Arc<ServerState>>,
    uri: axum::http::Uri,
) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "route": uri.path(),
        "version": env!("CARGO_PKG_VERSION"),
        "transport": state.transport,
    }))
}

/// Handles `POST /mcp`, returning JSON or an SSE stream per `Accept`.
async fn handle_mcp(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(generate_session_id, str::to_string);

    if headers.get(PROTOCOL_VERSION_HEADER).is_none() {
        let err = OpsError::new(
            ErrorKind::ProtocolMismatch,
            "missing mcp-protocol-version header",
        )
        .with_fix_hint(format!("send `{PROTOCOL_VERSION_HEADER}: {PROTOCOL_VERSION}`"));
        let response = jsonrpc_error_response(Value::Null, &err);
        return with_session(
            (StatusCode::BAD_REQUEST, axum::Json(response)).into_response(),
            &session_id,
        );
    }

    let auth_header =
        headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()).map(str::to_string);
    let wants_sse = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));

    let (status, response, _) = process_request(&state, auth_header.as_deref(), &bytes).await;

    if wants_sse {
        let payload = serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32050,"message":"serialization failed"}}"#
                .to_string()
        });
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, std::convert::Infallible>>(1);
        let _ = tx.send(Ok(Event::default().data(payload))).await;
        return with_session(Sse::new(ReceiverStream::new(rx)).into_response(), &session_id);
    }
    with_session((status, axum::Json(response)).into_response(), &session_id)
}

/// Attaches the session id header to a response.
fn with_session(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = axum::http::HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// Generates a process-unique session identifier.
fn generate_session_id() -> String {
    let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("mcp-{now:x}-{counter:x}")
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<JsonRpcError>,
}

/// JSON-RPC error payload carrying the uniform envelope as data.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcError {
    /// Error code.
    pub(crate) code: i64,
    /// One-sentence message.
    pub(crate) message: String,
    /// Full structured envelope.
    pub(crate) data: OpsError,
}

/// Tool call parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name in `module_action` form.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Request classification for telemetry.
#[derive(Debug, Clone)]
struct RequestInfo {
    /// Method classification.
    method: McpMethod,
    /// Tool name when available.
    tool: Option<String>,
    /// Caller subject when known.
    subject: Option<String>,
}

/// Parses, dispatches, and observes one JSON-RPC request.
async fn process_request(
    state: &Arc<ServerState>,
    auth_header: Option<&str>,
    bytes: &[u8],
) -> (StatusCode, JsonRpcResponse, RequestInfo) {
    let started_at = Instant::now();
    let mut info = RequestInfo {
        method: McpMethod::Invalid,
        tool: None,
        subject: None,
    };
    let (status, response) = match serde_json::from_slice::<JsonRpcRequest>(bytes) {
        Ok(request) if request.jsonrpc == "2.0" => {
            handle_request(state, auth_header, request, &mut info).await
        }
        Ok(request) => {
            let err = OpsError::validation("jsonrpc version must be 2.0");
            (StatusCode::BAD_REQUEST, jsonrpc_error_response(request.id, &err))
        }
        Err(_) => {
            let err = OpsError::validation("request body is not a json-rpc request");
            (StatusCode::BAD_REQUEST, jsonrpc_error_response(Value::Null, &err))
        }
    };
    observe(state, &info, &response, bytes.len(), started_at);
    (status, response, info)
}

/// Routes one well-formed JSON-RPC request.
async fn handle_request(
    state: &Arc<ServerState>,
    auth_header: Option<&str>,
    request: JsonRpcRequest,
    info: &mut RequestInfo,
) -> (StatusCode, JsonRpcResponse) {
    let id = request.id.clone();
    let request_id = id.to_string();
    info.method = classify_method(&request.method);

    // Bearer extraction and validation happen on every request.
    let ctx = match state.router.base_context(&request_id, auth_header) {
        Ok(ctx) => ctx,
        Err(err) => {
            let status = status_for(&err);
            return (status, jsonrpc_error_response(id, &err));
        }
    };
    info.subject = ctx.subject().map(str::to_string);

    let cancel = CancellationToken::new();
    // Dropping the guard on client disconnect cancels in-flight work.
    let _guard = cancel.clone().drop_guard();
    let ctx = ctx.with_cancel(cancel);

    let result: OpsResult<Value> = match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "quilt-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {"tools": {}, "resources": {}},
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({"tools": state.router.list_tools(false)})),
        "tools/call" => match serde_json::from_value::<ToolCallParams>(
            request.params.unwrap_or(Value::Null),
        ) {
            Ok(params) => {
                info.tool = Some(params.name.clone());
                call_tool_guarded(&state.router, &ctx, params.name, params.arguments).await
            }
            Err(err) => Err(OpsError::validation(format!("invalid tool params: {err}"))),
        },
        "resources/list" => Ok(json!({"resources": resource_list()})),
        "resources/read" => {
            let uri = request
                .params
                .as_ref()
                .and_then(|params| params.get("uri"))
                .and_then(Value::as_str)
                .map(str::to_string);
            match uri {
                Some(uri) => read_resource(state, &ctx, &uri).await,
                None => Err(OpsError::validation("resources/read requires a uri")),
            }
        }
        _ => Err(OpsError::new(
            ErrorKind::MethodNotFound,
            format!("unknown method: {}", request.method),
        )),
    };

    match result {
        Ok(value) => {
            let result = if request.method == "tools/call" {
                json!({"content": [{"type": "json", "json": value}]})
            } else {
                value
            };
            (
                StatusCode::OK,
                JsonRpcResponse {
                    jsonrpc: "2.0",
                    id,
                    result: Some(result),
                    error: None,
                },
            )
        }
        Err(err) => {
            let status = status_for(&err);
            (status, jsonrpc_error_response(id, &err))
        }
    }
}

/// Runs a tool call in a task so panics convert to `INTERNAL`.
async fn call_tool_guarded(
    router: &ToolRouter,
    ctx: &RequestContext,
    name: String,
    args: Value,
) -> OpsResult<Value> {
    let router = router.clone();
    let ctx = ctx.clone();
    let handle = tokio::spawn(async move { router.handle_tool_call(&ctx, &name, args).await });
    match handle.await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            Err(OpsError::internal("tool implementation panicked"))
        }
        Err(_) => Err(OpsError::new(ErrorKind::Timeout, "tool task cancelled")),
    }
}

// ============================================================================
// SECTION: Resources
// ============================================================================

/// Static resource descriptors.
fn resource_list() -> Vec<Value> {
    vec![
        json!({
            "uri": "quilt://config",
            "name": "Server configuration summary",
            "mimeType": "application/json",
        }),
        json!({
            "uri": "quilt://buckets",
            "name": "Buckets visible to the caller",
            "mimeType": "application/json",
        }),
    ]
}

/// Reads one resource by URI.
async fn read_resource(
    state: &Arc<ServerState>,
    ctx: &RequestContext,
    uri: &str,
) -> OpsResult<Value> {
    let contents = match uri {
        "quilt://config" => {
            let config = state.router.config();
            json!({
                "deployment": config.deployment,
                "backend": config.backend,
                "transport": config.transport,
                "catalog_url": config.catalog_url,
                "registry_url": config.registry_url,
                "require_jwt": config.require_jwt,
            })
        }
        "quilt://buckets" => {
            let backend = state.router.backend(ctx).await?;
            json!({"buckets": backend.bucket_list(ctx).await?})
        }
        other => return Err(OpsError::not_found(format!("unknown resource: {other}"))),
    };
    Ok(json!({"contents": [{
        "uri": uri,
        "mimeType": "application/json",
        "text": contents.to_string(),
    }]}))
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps an error kind to a JSON-RPC error code.
const fn jsonrpc_code(kind: ErrorKind) -> i64 {
    match kind {
        ErrorKind::MethodNotFound => -32601,
        ErrorKind::ValidationFailed => -32602,
        ErrorKind::ProtocolMismatch => -32600,
        ErrorKind::AuthInvalid => -32001,
        ErrorKind::AuthNoCredentials => -32002,
        ErrorKind::PermissionDenied => -32003,
        ErrorKind::NotFound => -32004,
        ErrorKind::Conflict => -32009,
        ErrorKind::InUse => -32010,
        ErrorKind::Timeout => -32011,
        ErrorKind::UpstreamUnavailable => -32012,
        ErrorKind::ConfigInvalid => -32013,
        ErrorKind::Internal => -32050,
    }
}

/// Maps an error kind to an HTTP status.
fn status_for(err: &OpsError) -> StatusCode {
    match err.kind {
        ErrorKind::AuthInvalid | ErrorKind::AuthNoCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::ProtocolMismatch | ErrorKind::ValidationFailed | ErrorKind::MethodNotFound => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::OK,
    }
}

/// Builds a JSON-RPC error response carrying the envelope.
fn jsonrpc_error_response(id: Value, err: &OpsError) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code: jsonrpc_code(err.kind),
            message: err.message.clone(),
            data: err.clone(),
        }),
    }
}

/// Classifies a method name for telemetry.
fn classify_method(method: &str) -> McpMethod {
    match method {
        "initialize" => McpMethod::Initialize,
        "tools/list" => McpMethod::ToolsList,
        "tools/call" => McpMethod::ToolsCall,
        "resources/list" => McpMethod::ResourcesList,
        "resources/read" => McpMethod::ResourcesRead,
        "ping" => McpMethod::Ping,
        _ => McpMethod::Other,
    }
}

/// Emits metrics and audit for one request.
fn observe(
    state: &Arc<ServerState>,
    info: &RequestInfo,
    response: &JsonRpcResponse,
    request_bytes: usize,
    started_at: Instant,
) {
    let outcome = if response.error.is_some() { McpOutcome::Error } else { McpOutcome::Ok };
    let error_kind = response.error.as_ref().map(|error| error.data.kind.as_str());
    let response_bytes = serde_json::to_vec(response).map_or(0, |payload| payload.len());
    let event = McpMetricEvent {
        transport: state.transport,
        method: info.method,
        tool: info.tool.clone(),
        outcome,
        error_kind,
        request_bytes,
        response_bytes,
    };
    state.metrics.record_request(event.clone());
    state.metrics.record_latency(event, started_at.elapsed());
    state.audit.record(&McpAuditEvent::new(McpAuditEventParams {
        request_id: None,
        transport: state.transport,
        method: info.method,
        tool: info.tool.clone(),
        outcome,
        error_kind,
        request_bytes,
        response_bytes,
        subject: info.subject.clone(),
    }));
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quilt_mcp_config::ConfigOverrides;
    use quilt_mcp_config::QuiltMcpConfig;
    use serde_json::json;
    use serde_json::Value;

    use super::classify_method;
    use super::jsonrpc_code;
    use super::process_request;
    use super::ServerState;
    use crate::audit::McpNoopAuditSink;
    use crate::telemetry::McpMethod;
    use crate::telemetry::NoopMetrics;
    use crate::tools::ToolRouter;

    fn test_config(require_jwt: bool) -> QuiltMcpConfig {
        QuiltMcpConfig::resolve_with(&ConfigOverrides::default(), move |name| match name {
            "QUILT_CATALOG_URL" => Some("https://demo.quiltdata.com".to_string()),
            "MCP_REQUIRE_JWT" if require_jwt => Some("true".to_string()),
            "MCP_JWT_SECRET" if require_jwt => Some("test-secret".to_string()),
            _ => None,
        })
        .expect("config")
    }

    async fn test_state(require_jwt: bool) -> Arc<ServerState> {
        let config = test_config(require_jwt);
        let router = ToolRouter::new(config.clone()).await.expect("router");
        Arc::new(ServerState {
            router,
            metrics: Arc::new(NoopMetrics),
            audit: Arc::new(McpNoopAuditSink),
            transport: config.transport,
        })
    }

    fn body(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).expect("body")
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let state = test_state(false).await;
        let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        let (_, response, info) = process_request(&state, None, &body(&payload)).await;
        assert!(response.error.is_none());
        assert_eq!(info.method, McpMethod::Initialize);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let state = test_state(false).await;
        let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/destroy"});
        let (_, response, _) = process_request(&state, None, &body(&payload)).await;
        let error = response.error.expect("error");
        assert_eq!(error.code, -32601);
        assert_eq!(error.data.kind, quilt_mcp_core::ErrorKind::MethodNotFound);
    }

    #[tokio::test]
    async fn tools_list_hides_advanced_fields() {
        let state = test_state(false).await;
        let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        let (_, response, _) = process_request(&state, None, &body(&payload)).await;
        assert!(response.error.is_none());
        let rendered = serde_json::to_string(&response).expect("render");
        assert!(!rendered.contains("[ADVANCED]"));
        assert!(rendered.contains("athena_query_execute"));
    }

    #[tokio::test]
    async fn malformed_arguments_fail_validation_before_any_backend() {
        let state = test_state(false).await;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {
                "name": "athena_query_execute",
                "arguments": {"query": "SELECT 1", "unexpected_field": true},
            },
        });
        let (_, response, _) = process_request(&state, None, &body(&payload)).await;
        let error = response.error.expect("error");
        assert_eq!(error.data.kind, quilt_mcp_core::ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn strict_mode_without_bearer_fails_every_tool_call() {
        let state = test_state(true).await;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "buckets_list", "arguments": {}},
        });
        let (status, response, _) = process_request(&state, None, &body(&payload)).await;
        assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
        let error = response.error.expect("error");
        assert_eq!(error.data.kind, quilt_mcp_core::ErrorKind::AuthNoCredentials);
    }

    #[tokio::test]
    async fn bad_signature_fails_with_auth_invalid() {
        let state = test_state(true).await;
        let claims = quilt_mcp_core::JwtClaims {
            sub: "alice".to_string(),
            iss: None,
            aud: None,
            exp: chrono::Utc::now().timestamp() + 600,
            roles: Vec::new(),
            buckets: Vec::new(),
            permissions: Vec::new(),
            credentials: None,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"wrong-secret"),
        )
        .expect("token");
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "buckets_list", "arguments": {}},
        });
        let header = format!("Bearer {token}");
        let (_, response, _) = process_request(&state, Some(&header), &body(&payload)).await;
        let error = response.error.expect("error");
        assert_eq!(error.data.kind, quilt_mcp_core::ErrorKind::AuthInvalid);
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let state = test_state(false).await;
        let (_, response, _) = process_request(&state, None, b"not json").await;
        let error = response.error.expect("error");
        assert_eq!(error.data.kind, quilt_mcp_core::ErrorKind::ValidationFailed);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(jsonrpc_code(quilt_mcp_core::ErrorKind::MethodNotFound), -32601);
        assert_eq!(jsonrpc_code(quilt_mcp_core::ErrorKind::ValidationFailed), -32602);
        assert_eq!(jsonrpc_code(quilt_mcp_core::ErrorKind::AuthInvalid), -32001);
        assert_eq!(jsonrpc_code(quilt_mcp_core::ErrorKind::Internal), -32050);
    }

    #[test]
    fn method_classification_covers_the_surface() {
        assert_eq!(classify_method("initialize"), McpMethod::Initialize);
        assert_eq!(classify_method("tools/call"), McpMethod::ToolsCall);
        assert_eq!(classify_method("resources/read"), McpMethod::ResourcesRead);
        assert_eq!(classify_method("ping"), McpMethod::Ping);
        assert_eq!(classify_method("bogus"), McpMethod::Other);
    }
}
