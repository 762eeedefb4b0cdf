// quilt-mcp-catalog/src/admin.rs
// ============================================================================
// Module: Catalog Admin Protocol
// Description: User, role, policy, and SSO administration over GraphQL.
// Purpose: Map catalog mutation unions into the uniform error envelope.
// Dependencies: quilt-mcp-core, serde_json
// ============================================================================

//! ## Overview
//! Admin mutations return a union of `{Success | InvalidInput |
//! OperationError}`. `InvalidInput` maps to `VALIDATION_FAILED`,
//! `OperationError` maps by name — a policy attached to a role refuses
//! deletion with `IN_USE` — and everything else surfaces as upstream failure.
//! Only the GraphQL backend exposes these operations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use crate::client::CatalogClient;

// ============================================================================
// SECTION: GraphQL Documents
// ============================================================================

const USERS_LIST_QUERY: &str = r"query UsersList {
  admin { user { list { name email isActive isAdmin role { name } } } }
}";

const USER_CREATE_MUTATION: &str = r"mutation UserCreate($input: UserInput!) {
  admin { user { create(input: $input) {
    __typename
    ... on User { name email }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  } } }
}";

const USER_DELETE_MUTATION: &str = r"mutation UserDelete($name: String!) {
  admin { user { mutate(name: $name) { delete {
    __typename
    ... on Ok { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  } } } }
}";

const ROLES_LIST_QUERY: &str = r"query RolesList {
  roles {
    __typename
    ... on ManagedRole { id name policies { id title } }
    ... on UnmanagedRole { id name arn }
  }
}";

const ROLE_CREATE_MANAGED_MUTATION: &str = r"mutation RoleCreateManaged($input: ManagedRoleInput!) {
  roleCreateManaged(input: $input) {
    __typename
    ... on RoleCreateSuccess { role { ... on ManagedRole { id name } } }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const ROLE_CREATE_UNMANAGED_MUTATION: &str =
    r"mutation RoleCreateUnmanaged($input: UnmanagedRoleInput!) {
  roleCreateUnmanaged(input: $input) {
    __typename
    ... on RoleCreateSuccess { role { ... on UnmanagedRole { id name arn } } }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const ROLE_DELETE_MUTATION: &str = r"mutation RoleDelete($id: ID!) {
  roleDelete(id: $id) {
    __typename
    ... on RoleDeleteSuccess { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const POLICIES_LIST_QUERY: &str = r"query PoliciesList {
  policies {
    __typename
    id
    title
    ... on ManagedPolicy { permissions { bucket { name } level } roles { name } }
    ... on UnmanagedPolicy { arn roles { name } }
  }
}";

const POLICY_CREATE_MANAGED_MUTATION: &str =
    r"mutation PolicyCreateManaged($input: ManagedPolicyInput!) {
  policyCreateManaged(input: $input) {
    __typename
    ... on Policy { id title }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const POLICY_CREATE_UNMANAGED_MUTATION: &str =
    r"mutation PolicyCreateUnmanaged($input: UnmanagedPolicyInput!) {
  policyCreateUnmanaged(input: $input) {
    __typename
    ... on Policy { id title }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const POLICY_DELETE_MUTATION: &str = r"mutation PolicyDelete($id: ID!) {
  policyDelete(id: $id) {
    __typename
    ... on Ok { _ }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  }
}";

const SSO_CONFIG_QUERY: &str = r"query SsoConfig {
  admin { ssoConfig { text timestamp uploader { name } } }
}";

const SSO_CONFIG_SET_MUTATION: &str = r"mutation SsoConfigSet($config: String) {
  admin { setSsoConfig(config: $config) {
    __typename
    ... on SsoConfig { text timestamp }
    ... on InvalidInput { errors { path message } }
    ... on OperationError { message name }
  } }
}";

// ============================================================================
// SECTION: Shapes
// ============================================================================

/// Bucket-level permission inside a managed policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    /// Read-only access.
    Read,
    /// Read and write access.
    ReadWrite,
}

/// One bucket permission entry of a managed policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPermission {
    /// Bucket name.
    pub bucket: String,
    /// Granted level.
    pub level: PermissionLevel,
}

/// Input for creating a managed policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedPolicyInput {
    /// Policy title.
    pub title: String,
    /// Bucket permissions.
    pub permissions: Vec<BucketPermission>,
}

/// Catalog user summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name.
    pub name: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the account is active.
    #[serde(default)]
    pub is_active: bool,
    /// Whether the account holds admin rights.
    #[serde(default)]
    pub is_admin: bool,
    /// Assigned role name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Catalog role summary, managed or unmanaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleInfo {
    /// Role composed of catalog-managed policies.
    Managed {
        /// Role identifier.
        id: String,
        /// Role name.
        name: String,
        /// Titles of attached policies.
        policies: Vec<String>,
    },
    /// Role backed by an IAM role ARN.
    Unmanaged {
        /// Role identifier.
        id: String,
        /// Role name.
        name: String,
        /// IAM role ARN.
        arn: String,
    },
}

/// Catalog policy summary, managed or unmanaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyInfo {
    /// Policy holding a bucket-permission list.
    Managed {
        /// Policy identifier.
        id: String,
        /// Policy title.
        title: String,
        /// Bucket permissions.
        permissions: Vec<BucketPermission>,
        /// Names of roles the policy is attached to.
        roles: Vec<String>,
    },
    /// Policy backed by an IAM policy ARN.
    Unmanaged {
        /// Policy identifier.
        id: String,
        /// Policy title.
        title: String,
        /// IAM policy ARN.
        arn: String,
        /// Names of roles the policy is attached to.
        roles: Vec<String>,
    },
}

/// SSO configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoConfigInfo {
    /// Raw configuration text.
    pub text: String,
    /// Upload timestamp in RFC 3339 form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Uploader user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
}

// ============================================================================
// SECTION: Admin Client
// ============================================================================

/// Admin operations over one catalog client.
#[derive(Debug, Clone)]
pub struct AdminClient {
    /// Underlying catalog client.
    catalog: CatalogClient,
}

impl AdminClient {
    /// Wraps a catalog client for admin operations.
    #[must_use]
    pub fn new(catalog: CatalogClient) -> Self {
        Self {
            catalog,
        }
    }

    /// Lists catalog users.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the query fails.
    pub async fn users_list(&self, token: Option<&str>) -> OpsResult<Vec<UserInfo>> {
        let data = self.catalog.graphql(token, USERS_LIST_QUERY, json!({})).await?;
        let users = data
            .pointer("/admin/user/list")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(users.into_iter().map(parse_user).collect())
    }

    /// Creates a catalog user.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` on invalid input, `CONFLICT` when the name
    /// is taken, or the mapped envelope on other failures.
    pub async fn user_create(
        &self,
        token: Option<&str>,
        name: &str,
        email: &str,
        role: &str,
    ) -> OpsResult<Value> {
        let variables = json!({"input": {"name": name, "email": email, "role": role}});
        let data = self.catalog.graphql(token, USER_CREATE_MUTATION, variables).await?;
        expect_union(&data, "/admin/user/create")
    }

    /// Deletes a catalog user.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn user_delete(&self, token: Option<&str>, name: &str) -> OpsResult<()> {
        let data = self
            .catalog
            .graphql(token, USER_DELETE_MUTATION, json!({"name": name}))
            .await?;
        expect_union(&data, "/admin/user/mutate/delete").map(|_| ())
    }

    /// Lists catalog roles.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the query fails.
    pub async fn roles_list(&self, token: Option<&str>) -> OpsResult<Vec<RoleInfo>> {
        let data = self.catalog.graphql(token, ROLES_LIST_QUERY, json!({})).await?;
        let roles = data.get("roles").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(roles.iter().filter_map(parse_role).collect())
    }

    /// Creates a managed role composed of policies.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn role_create_managed(
        &self,
        token: Option<&str>,
        name: &str,
        policy_ids: &[String],
    ) -> OpsResult<Value> {
        let variables = json!({"input": {"name": name, "policies": policy_ids}});
        let data = self.catalog.graphql(token, ROLE_CREATE_MANAGED_MUTATION, variables).await?;
        expect_union(&data, "/roleCreateManaged")
    }

    /// Creates an unmanaged role referencing an IAM role ARN.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn role_create_unmanaged(
        &self,
        token: Option<&str>,
        name: &str,
        arn: &str,
    ) -> OpsResult<Value> {
        let variables = json!({"input": {"name": name, "arn": arn}});
        let data = self.catalog.graphql(token, ROLE_CREATE_UNMANAGED_MUTATION, variables).await?;
        expect_union(&data, "/roleCreateUnmanaged")
    }

    /// Deletes a role by identifier.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn role_delete(&self, token: Option<&str>, id: &str) -> OpsResult<()> {
        let data = self.catalog.graphql(token, ROLE_DELETE_MUTATION, json!({"id": id})).await?;
        expect_union(&data, "/roleDelete").map(|_| ())
    }

    /// Lists catalog policies.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the query fails.
    pub async fn policies_list(&self, token: Option<&str>) -> OpsResult<Vec<PolicyInfo>> {
        let data = self.catalog.graphql(token, POLICIES_LIST_QUERY, json!({})).await?;
        let policies = data.get("policies").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(policies.iter().filter_map(parse_policy).collect())
    }

    /// Creates a managed policy with a bucket-permission list.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn policy_create_managed(
        &self,
        token: Option<&str>,
        input: &ManagedPolicyInput,
    ) -> OpsResult<Value> {
        let permissions: Vec<Value> = input
            .permissions
            .iter()
            .map(|permission| {
                json!({"bucket": permission.bucket, "level": permission.level})
            })
            .collect();
        let variables = json!({"input": {"title": input.title, "permissions": permissions}});
        let data = self.catalog.graphql(token, POLICY_CREATE_MANAGED_MUTATION, variables).await?;
        expect_union(&data, "/policyCreateManaged")
    }

    /// Creates an unmanaged policy referencing an IAM policy ARN.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn policy_create_unmanaged(
        &self,
        token: Option<&str>,
        title: &str,
        arn: &str,
    ) -> OpsResult<Value> {
        let variables = json!({"input": {"title": title, "arn": arn}});
        let data =
            self.catalog.graphql(token, POLICY_CREATE_UNMANAGED_MUTATION, variables).await?;
        expect_union(&data, "/policyCreateUnmanaged")
    }

    /// Deletes a policy; refused with `IN_USE` while attached to any role.
    ///
    /// # Errors
    ///
    /// Returns `IN_USE` when the policy is attached, or the mapped envelope
    /// on other failures.
    pub async fn policy_delete(&self, token: Option<&str>, id: &str) -> OpsResult<()> {
        let data = self.catalog.graphql(token, POLICY_DELETE_MUTATION, json!({"id": id})).await?;
        expect_union(&data, "/policyDelete").map(|_| ())
    }

    /// Fetches the SSO configuration document.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when no config is set, or the mapped envelope on
    /// other failures.
    pub async fn sso_config_get(&self, token: Option<&str>) -> OpsResult<SsoConfigInfo> {
        let data = self.catalog.graphql(token, SSO_CONFIG_QUERY, json!({})).await?;
        let node = data.pointer("/admin/ssoConfig").cloned().unwrap_or(Value::Null);
        if node.is_null() {
            return Err(OpsError::not_found("no SSO configuration is set"));
        }
        Ok(SsoConfigInfo {
            text: node.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            timestamp: node.get("timestamp").and_then(Value::as_str).map(str::to_string),
            uploader: node
                .pointer("/uploader/name")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Replaces the SSO configuration document.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the mutation fails.
    pub async fn sso_config_set(&self, token: Option<&str>, config: &str) -> OpsResult<Value> {
        let data = self
            .catalog
            .graphql(token, SSO_CONFIG_SET_MUTATION, json!({"config": config}))
            .await?;
        expect_union(&data, "/admin/setSsoConfig")
    }
}

// ============================================================================
// SECTION: Union Handling
// ============================================================================

/// Resolves a mutation union node, mapping failure variants to the envelope.
fn expect_union(data: &Value, pointer: &str) -> OpsResult<Value> {
    let node = data
        .pointer(pointer)
        .ok_or_else(|| {
            OpsError::new(ErrorKind::UpstreamUnavailable, "catalog returned no mutation result")
        })?
        .clone();
    match node.get("__typename").and_then(Value::as_str) {
        Some("InvalidInput") => {
            let detail = node
                .pointer("/errors")
                .and_then(Value::as_array)
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e.get("message").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            Err(OpsError::validation(format!("catalog rejected the input: {detail}")))
        }
        Some("OperationError") => {
            let name = node.get("name").and_then(Value::as_str).unwrap_or_default();
            let message =
                node.get("message").and_then(Value::as_str).unwrap_or("operation failed");
            Err(map_operation_error(name, message))
        }
        _ => Ok(node),
    }
}

/// Maps a catalog `OperationError` name to an error kind.
fn map_operation_error(name: &str, message: &str) -> OpsError {
    match name {
        "PolicyInUse" | "RoleInUse" => OpsError::new(
            ErrorKind::InUse,
            format!("delete refused while referenced: {message}"),
        )
        .with_fix_hint("detach the policy from all roles first"),
        "AlreadyExists" | "NameTaken" => OpsError::new(ErrorKind::Conflict, message.to_string()),
        "Forbidden" => OpsError::new(ErrorKind::PermissionDenied, message.to_string()),
        _ => OpsError::new(ErrorKind::UpstreamUnavailable, message.to_string()),
    }
}

// ============================================================================
// SECTION: Parsers
// ============================================================================

fn parse_user(value: Value) -> UserInfo {
    UserInfo {
        name: value.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        email: value.get("email").and_then(Value::as_str).map(str::to_string),
        is_active: value.get("isActive").and_then(Value::as_bool).unwrap_or(false),
        is_admin: value.get("isAdmin").and_then(Value::as_bool).unwrap_or(false),
        role: value.pointer("/role/name").and_then(Value::as_str).map(str::to_string),
    }
}

fn parse_role(value: &Value) -> Option<RoleInfo> {
    let id = value.get("id")?.as_str()?.to_string();
    let name = value.get("name")?.as_str()?.to_string();
    match value.get("__typename").and_then(Value::as_str) {
        Some("ManagedRole") => {
            let policies = value
                .get("policies")
                .and_then(Value::as_array)
                .map(|policies| {
                    policies
                        .iter()
                        .filter_map(|p| p.get("title").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(RoleInfo::Managed {
                id,
                name,
                policies,
            })
        }
        Some("UnmanagedRole") => Some(RoleInfo::Unmanaged {
            id,
            name,
            arn: value.get("arn").and_then(Value::as_str).unwrap_or_default().to_string(),
        }),
        _ => None,
    }
}

fn parse_policy(value: &Value) -> Option<PolicyInfo> {
    let id = value.get("id")?.as_str()?.to_string();
    let title = value.get("title")?.as_str()?.to_string();
    let roles = value
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    match value.get("__typename").and_then(Value::as_str) {
        Some("ManagedPolicy") => {
            let permissions = value
                .get("permissions")
                .and_then(Value::as_array)
                .map(|permissions| {
                    permissions
                        .iter()
                        .filter_map(|p| {
                            let bucket =
                                p.pointer("/bucket/name").and_then(Value::as_str)?.to_string();
                            let level = match p.get("level").and_then(Value::as_str)? {
                                "READ" => PermissionLevel::Read,
                                "READ_WRITE" => PermissionLevel::ReadWrite,
                                _ => return None,
                            };
                            Some(BucketPermission {
                                bucket,
                                level,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(PolicyInfo::Managed {
                id,
                title,
                permissions,
                roles,
            })
        }
        Some("UnmanagedPolicy") => Some(PolicyInfo::Unmanaged {
            id,
            title,
            arn: value.get("arn").and_then(Value::as_str).unwrap_or_default().to_string(),
            roles,
        }),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ErrorKind;
    use serde_json::json;

    use super::expect_union;
    use super::parse_policy;
    use super::parse_role;
    use super::PermissionLevel;
    use super::PolicyInfo;
    use super::RoleInfo;

    #[test]
    fn invalid_input_maps_to_validation_failed() {
        let data = json!({"policyCreateManaged": {
            "__typename": "InvalidInput",
            "errors": [{"path": "title", "message": "title must be set"}],
        }});
        let err = expect_union(&data, "/policyCreateManaged").expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
        assert!(err.message.contains("title must be set"));
    }

    #[test]
    fn policy_in_use_maps_to_in_use() {
        let data = json!({"policyDelete": {
            "__typename": "OperationError",
            "name": "PolicyInUse",
            "message": "policy attached to role engineering",
        }});
        let err = expect_union(&data, "/policyDelete").expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::InUse);
        assert!(!err.retriable);
    }

    #[test]
    fn success_variant_passes_through() {
        let data = json!({"policyDelete": {"__typename": "Ok", "_": true}});
        let node = expect_union(&data, "/policyDelete").expect("ok");
        assert_eq!(node["__typename"], "Ok");
    }

    #[test]
    fn roles_parse_managed_and_unmanaged() {
        let managed = json!({
            "__typename": "ManagedRole",
            "id": "r1",
            "name": "eng",
            "policies": [{"id": "p1", "title": "readers"}],
        });
        let unmanaged = json!({
            "__typename": "UnmanagedRole",
            "id": "r2",
            "name": "ops",
            "arn": "arn:aws:iam::1:role/ops",
        });
        match parse_role(&managed).expect("managed") {
            RoleInfo::Managed {
                policies, ..
            } => assert_eq!(policies, vec!["readers"]),
            RoleInfo::Unmanaged {
                ..
            } => panic!("expected managed role"),
        }
        match parse_role(&unmanaged).expect("unmanaged") {
            RoleInfo::Unmanaged {
                arn, ..
            } => assert_eq!(arn, "arn:aws:iam::1:role/ops"),
            RoleInfo::Managed {
                ..
            } => panic!("expected unmanaged role"),
        }
    }

    #[test]
    fn policies_parse_permissions_and_roles() {
        let value = json!({
            "__typename": "ManagedPolicy",
            "id": "p1",
            "title": "readers",
            "permissions": [{"bucket": {"name": "b1"}, "level": "READ"}],
            "roles": [{"name": "eng"}],
        });
        match parse_policy(&value).expect("policy") {
            PolicyInfo::Managed {
                permissions,
                roles,
                ..
            } => {
                assert_eq!(permissions.len(), 1);
                assert_eq!(permissions[0].bucket, "b1");
                assert_eq!(permissions[0].level, PermissionLevel::Read);
                assert_eq!(roles, vec!["eng"]);
            }
            PolicyInfo::Unmanaged {
                ..
            } => panic!("expected managed policy"),
        }
    }
}
