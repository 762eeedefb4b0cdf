// quilt-mcp/src/tools.rs
// ============================================================================
// Module: MCP Tool Router
// Description: Tool registry, discovery filtering, and action dispatch.
// Purpose: Route module_action tool calls through QuiltOps uniformly.
// Dependencies: quilt-mcp-ops, quilt-mcp-config, serde_json
// ============================================================================

//! ## Overview
//! Tools register once at startup as `module_action` descriptors with JSON
//! parameter schemas; the registry is immutable afterwards and a fixed
//! exclusion list disables a small diagnostic subset. Dispatch validates
//! arguments before any backend is constructed, so malformed input never
//! touches a backend, and every failure crossing this layer is already the
//! uniform error envelope.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod admin;
pub mod athena;
pub mod auth_tools;
pub mod buckets;
pub mod packaging;
pub mod search_tools;
pub mod tabulator;
pub mod workflow_tools;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use quilt_mcp_config::QuiltMcpConfig;
use quilt_mcp_core::DeploymentMode;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use quilt_mcp_core::RequestContext;
use quilt_mcp_ops::BackendFactory;
use quilt_mcp_ops::QuiltOps;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::auth::extract_bearer;
use crate::auth::JwtVerifier;
use crate::credentials::CredentialCache;
use crate::credentials::CredentialResolver;
use crate::workflow::WorkflowStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tools registered but disabled at startup.
const EXCLUDED_TOOLS: &[&str] = &["auth_jwt_diagnostics"];

/// Discovery tags hiding schema fields from the default listing.
const HIDDEN_FIELD_TAGS: &[&str] = &["[ADVANCED]", "[INTERNAL]"];

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Effect classification for a tool action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEffect {
    /// Reads state.
    Read,
    /// Creates new state.
    Create,
    /// Mutates existing state.
    Update,
    /// Removes state.
    Remove,
    /// Administrative operation.
    Admin,
}

/// One registered tool action.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Full tool name in `module_action` form.
    pub name: &'static str,
    /// Owning module.
    pub module: &'static str,
    /// One-line description for discovery.
    pub description: &'static str,
    /// Effect classification.
    pub effect: ToolEffect,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
    /// Requirements enforced before dispatch.
    pub requirements: &'static [&'static str],
}

/// Tool definition advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Full tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Advertised input schema with hidden fields removed.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Shared router state behind one Arc.
struct RouterInner {
    /// Resolved configuration.
    config: QuiltMcpConfig,
    /// Backend factory.
    factory: BackendFactory,
    /// Credential resolver and cache.
    resolver: CredentialResolver,
    /// JWT verifier when a secret is configured.
    verifier: Option<JwtVerifier>,
    /// Legacy workflow records.
    workflows: WorkflowStore,
    /// Immutable tool registry.
    registry: Vec<ToolDescriptor>,
}

/// Tool router for MCP requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Shared state.
    inner: Arc<RouterInner>,
}

impl ToolRouter {
    /// Builds the router, resolving the JWT secret source once.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the factory or secret fails.
    pub async fn new(config: QuiltMcpConfig) -> OpsResult<Self> {
        let factory = BackendFactory::from_config(&config)?;
        let verifier = JwtVerifier::from_config(&config).await?;
        let resolver = CredentialResolver::new(
            factory.catalog().cloned(),
            Arc::new(CredentialCache::new()),
            config.require_jwt,
        );
        let registry = build_registry(&config);
        Ok(Self {
            inner: Arc::new(RouterInner {
                config,
                factory,
                resolver,
                verifier,
                workflows: WorkflowStore::new(),
                registry,
            }),
        })
    }

    /// Returns the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &QuiltMcpConfig {
        &self.inner.config
    }

    /// Returns the credential resolver.
    #[must_use]
    pub(crate) fn resolver(&self) -> &CredentialResolver {
        &self.inner.resolver
    }

    /// Returns the legacy workflow store.
    #[must_use]
    pub(crate) fn workflows(&self) -> &WorkflowStore {
        &self.inner.workflows
    }

    /// Returns the S3 construction options.
    #[must_use]
    pub(crate) fn s3_options(&self) -> &quilt_mcp_aws::S3Options {
        self.inner.factory.s3_options()
    }

    /// Returns the pooled catalog client, when configured.
    #[must_use]
    pub(crate) fn catalog(&self) -> Option<&quilt_mcp_catalog::CatalogClient> {
        self.inner.factory.catalog()
    }

    /// Builds the base request context from transport metadata.
    ///
    /// A present bearer token is validated when a secret is configured; a
    /// missing token is only an error in strict mode.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_INVALID` for bad tokens and `AUTH_NO_CREDENTIALS` in
    /// strict mode without one.
    pub fn base_context(
        &self,
        request_id: &str,
        auth_header: Option<&str>,
    ) -> OpsResult<RequestContext> {
        let config = &self.inner.config;
        let mut ctx = RequestContext::new(request_id, config.deployment, config.backend)
            .with_urls(config.catalog_url.clone(), config.registry_url.clone());
        let bearer = extract_bearer(auth_header)?;
        match bearer {
            Some(token) => {
                if let Some(verifier) = &self.inner.verifier {
                    let claims = verifier.verify(&token)?;
                    ctx = ctx.with_claims(claims);
                }
                ctx = ctx.with_bearer(token);
            }
            None if config.require_jwt => {
                return Err(OpsError::new(
                    ErrorKind::AuthNoCredentials,
                    "strict mode requires a bearer token",
                )
                .with_fix_hint("send `authorization: Bearer <jwt>`"));
            }
            None => {}
        }
        Ok(ctx)
    }

    /// Returns a context with AWS credentials resolved through the chain.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_NO_CREDENTIALS` when strict mode exhausts the chain.
    pub async fn aws_context(&self, ctx: &RequestContext) -> OpsResult<RequestContext> {
        let resolved = self
            .inner
            .resolver
            .resolve(ctx.claims.as_ref(), ctx.bearer.as_deref())
            .await?;
        Ok(match resolved {
            Some(bundle) => ctx.clone().with_credentials(bundle),
            None => ctx.clone(),
        })
    }

    /// Builds the backend for one request.
    ///
    /// # Errors
    ///
    /// Returns the factory's envelope on failure.
    pub async fn backend(&self, ctx: &RequestContext) -> OpsResult<QuiltOps> {
        self.inner.factory.for_request(ctx).await
    }

    /// Lists advertised tools; hidden-tagged fields are stripped unless
    /// `advanced` is set.
    #[must_use]
    pub fn list_tools(&self, advanced: bool) -> Vec<ToolDefinition> {
        self.inner
            .registry
            .iter()
            .map(|descriptor| ToolDefinition {
                name: descriptor.name.to_string(),
                description: descriptor.description.to_string(),
                input_schema: if advanced {
                    descriptor.input_schema.clone()
                } else {
                    strip_hidden_fields(&descriptor.input_schema)
                },
            })
            .collect()
    }

    /// Returns the descriptor for a registered tool.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.inner.registry.iter().find(|descriptor| descriptor.name == name)
    }

    /// Dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns `METHOD_NOT_FOUND` for unknown tools and the handler's
    /// envelope otherwise.
    pub async fn handle_tool_call(
        &self,
        ctx: &RequestContext,
        name: &str,
        args: Value,
    ) -> OpsResult<Value> {
        let descriptor = self.descriptor(name).ok_or_else(|| {
            OpsError::new(ErrorKind::MethodNotFound, format!("unknown tool: {name}"))
                .with_alternatives(vec!["search_query".to_string()])
        })?;
        match descriptor.module {
            "auth" => auth_tools::handle(self, ctx, name, args).await,
            "buckets" => buckets::handle(self, ctx, name, args).await,
            "packaging" => packaging::handle(self, ctx, name, args).await,
            "athena" => athena::handle(self, ctx, name, args).await,
            "tabulator" => tabulator::handle(self, ctx, name, args).await,
            "search" => search_tools::handle(self, ctx, name, args).await,
            "admin" => admin::handle(self, ctx, name, args).await,
            "workflow" => workflow_tools::handle(self, ctx, name, args).await,
            module => Err(OpsError::internal(format!("module {module} has no handler"))),
        }
    }
}

// ============================================================================
// SECTION: Registry Construction
// ============================================================================

/// Builds the immutable tool registry for the resolved configuration.
fn build_registry(config: &QuiltMcpConfig) -> Vec<ToolDescriptor> {
    let mut registry = Vec::new();
    registry.extend(auth_tools::descriptors());
    registry.extend(buckets::descriptors());
    registry.extend(packaging::descriptors());
    registry.extend(athena::descriptors());
    registry.extend(tabulator::descriptors());
    registry.extend(search_tools::descriptors());
    registry.extend(admin::descriptors());
    if config.deployment == DeploymentMode::Legacy {
        registry.extend(workflow_tools::descriptors());
    }
    registry.retain(|descriptor| !EXCLUDED_TOOLS.contains(&descriptor.name));
    registry
}

/// Strips schema properties whose description carries a hidden tag.
fn strip_hidden_fields(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Some(properties) = schema.get_mut("properties").and_then(Value::as_object_mut) {
        properties.retain(|_, property| {
            property
                .get("description")
                .and_then(Value::as_str)
                .map_or(true, |description| {
                    !HIDDEN_FIELD_TAGS.iter().any(|tag| description.contains(tag))
                })
        });
    }
    schema
}

/// Decodes tool arguments, rejecting unknown fields.
///
/// # Errors
///
/// Returns `VALIDATION_FAILED` with the serde diagnostic.
pub(crate) fn decode_args<T: for<'de> Deserialize<'de>>(args: Value) -> OpsResult<T> {
    serde_json::from_value(args)
        .map_err(|err| OpsError::validation(format!("invalid arguments: {err}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_config::ConfigOverrides;
    use quilt_mcp_config::QuiltMcpConfig;
    use quilt_mcp_core::DeploymentMode;
    use serde_json::json;

    use super::build_registry;
    use super::strip_hidden_fields;

    fn config(deployment: DeploymentMode) -> QuiltMcpConfig {
        let overrides = ConfigOverrides {
            deployment: Some(deployment),
            ..ConfigOverrides::default()
        };
        QuiltMcpConfig::resolve_with(&overrides, |name| match name {
            "QUILT_CATALOG_URL" => Some("https://demo.quiltdata.com".to_string()),
            _ => None,
        })
        .expect("config")
    }

    #[test]
    fn registry_is_module_action_named_and_unique() {
        let registry = build_registry(&config(DeploymentMode::Local));
        assert!(!registry.is_empty());
        for descriptor in &registry {
            assert!(
                descriptor.name.starts_with(descriptor.module)
                    || descriptor.module == "search"
                    || descriptor.module == "workflow",
                "{} must carry its module prefix",
                descriptor.name
            );
        }
        let mut names: Vec<&str> = registry.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), registry.len(), "tool names must be unique");
    }

    #[test]
    fn excluded_tools_are_not_registered() {
        let registry = build_registry(&config(DeploymentMode::Local));
        assert!(registry.iter().all(|descriptor| descriptor.name != "auth_jwt_diagnostics"));
    }

    #[test]
    fn workflow_tools_register_only_in_legacy_mode() {
        let local = build_registry(&config(DeploymentMode::Local));
        assert!(local.iter().all(|descriptor| descriptor.module != "workflow"));
        let legacy = build_registry(&config(DeploymentMode::Legacy));
        assert!(legacy.iter().any(|descriptor| descriptor.module == "workflow"));
    }

    #[test]
    fn hidden_tagged_fields_are_stripped_from_discovery() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "SQL text"},
                "output_location": {
                    "type": "string",
                    "description": "[ADVANCED] result staging override",
                },
            },
        });
        let stripped = strip_hidden_fields(&schema);
        assert!(stripped.pointer("/properties/query").is_some());
        assert!(stripped.pointer("/properties/output_location").is_none());
    }
}
