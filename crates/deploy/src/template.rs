//! Governance template definitions.
//!
//! A template is a TOML file listing the contract roles of an organization, in
//! declaration order, together with the constructor parameters of each role and
//! the permissions the roles grant each other once deployed.
//!
//! ```toml
//! name = "reputation-template-oracle"
//! primary = "template"
//!
//! [[role]]
//! name = "template"
//! contract = "ReputationOracleTemplate"
//! params = [{ role = "dao_factory" }, { role = "ens" }]
//!
//! [[role.grant]]
//! role = "oracle"
//! permission = "EXECUTE_ROLE"
//! ```

use std::fmt;
use std::path::Path;

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Signature of the grant function called on the grantor of a permission edge.
pub const DEFAULT_PERMISSION_FN: &str = "grantPermission(address,bytes32)";

fn default_permission_fn() -> String {
    DEFAULT_PERMISSION_FN.to_string()
}

/// A deployable organization template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Template identifier, e.g. `reputation-template-oracle`.
    pub name: String,
    /// Role whose address is reported once the deployment succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Grant function invoked on the grantor contract for every permission edge.
    #[serde(default = "default_permission_fn")]
    pub permission_fn: String,
    /// Contract roles, in declaration order.
    #[serde(default, rename = "role")]
    pub roles: Vec<RoleNode>,
}

/// A named contract slot of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleNode {
    /// Role name, unique within the template.
    pub name: String,
    /// Name of the compiled artifact deployed for this role.
    pub contract: String,
    /// Constructor parameters, ABI-encoded in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ConstructorParam>,
    /// Permissions this role grants to other roles.
    #[serde(default, rename = "grant", skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<PermissionRef>,
    /// Permissions this role receives from other roles.
    #[serde(default, rename = "receive", skip_serializing_if = "Vec::is_empty")]
    pub receives: Vec<PermissionRef>,
}

/// One side of a permission edge as written in a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionRef {
    /// The counterpart role.
    pub role: String,
    /// Permission name (hashed) or a 0x-prefixed 32-byte id.
    pub permission: String,
}

/// A constructor argument.
///
/// `Role` is a placeholder: the address of the referenced role is only known
/// once that role has been created (or resolved from the registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructorParam {
    Role(String),
    Address(Address),
    /// 256-bit unsigned integer, decimal or 0x-prefixed.
    Uint(String),
    Bool(bool),
    Bytes32(B256),
    Permission(String),
}

impl ConstructorParam {
    /// The role referenced by this parameter, if it is a placeholder.
    pub fn role_ref(&self) -> Option<&str> {
        match self {
            ConstructorParam::Role(role) => Some(role),
            _ => None,
        }
    }
}

/// A directional authorization: `grantor` grants `permission` to `grantee`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionEdge {
    pub grantor: String,
    pub grantee: String,
    pub permission: String,
}

impl PermissionEdge {
    pub fn new(
        grantor: impl Into<String>,
        grantee: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            grantor: grantor.into(),
            grantee: grantee.into(),
            permission: permission.into(),
        }
    }

    /// Both endpoints of the edge.
    pub fn endpoints(&self) -> [&str; 2] {
        [&self.grantor, &self.grantee]
    }
}

impl fmt::Display for PermissionEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.grantor, self.grantee, self.permission)
    }
}

impl RoleNode {
    pub fn new(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: contract.into(),
            params: Vec::new(),
            grants: Vec::new(),
            receives: Vec::new(),
        }
    }

    pub fn param(mut self, param: ConstructorParam) -> Self {
        self.params.push(param);
        self
    }

    /// Declare that this role grants `permission` to `grantee`.
    pub fn grant(mut self, grantee: impl Into<String>, permission: impl Into<String>) -> Self {
        self.grants.push(PermissionRef {
            role: grantee.into(),
            permission: permission.into(),
        });
        self
    }

    /// Declare that this role receives `permission` from `grantor`.
    pub fn receive(mut self, grantor: impl Into<String>, permission: impl Into<String>) -> Self {
        self.receives.push(PermissionRef {
            role: grantor.into(),
            permission: permission.into(),
        });
        self
    }

    /// Roles referenced by constructor placeholders.
    pub fn param_refs(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(ConstructorParam::role_ref)
    }

    /// Permission edges declared on this role, grants first.
    pub fn edges(&self) -> impl Iterator<Item = PermissionEdge> + '_ {
        let grants = self
            .grants
            .iter()
            .map(|g| PermissionEdge::new(&self.name, &g.role, &g.permission));
        let receives = self
            .receives
            .iter()
            .map(|r| PermissionEdge::new(&r.role, &self.name, &r.permission));
        grants.chain(receives)
    }
}

impl TemplateSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary: None,
            permission_fn: default_permission_fn(),
            roles: Vec::new(),
        }
    }

    pub fn role(mut self, role: RoleNode) -> Self {
        self.roles.push(role);
        self
    }

    pub fn primary(mut self, role: impl Into<String>) -> Self {
        self.primary = Some(role.into());
        self
    }

    /// Look up a declared role by name.
    pub fn find_role(&self, name: &str) -> Option<&RoleNode> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Look up a role by role name first, then by contract name.
    pub fn find_target(&self, target: &str) -> Option<&RoleNode> {
        self.find_role(target)
            .or_else(|| self.roles.iter().find(|r| r.contract == target))
    }

    /// Parse a template from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse template as TOML")
    }

    /// Load a template from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Template file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template from {}", path.display()))?;
        let spec = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid template {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            template = %spec.name,
            roles = spec.roles.len(),
            "Template loaded"
        );
        Ok(spec)
    }

    /// Load the template `<name>.toml` from a templates directory.
    pub fn load(templates_dir: &Path, name: &str) -> Result<Self> {
        let path = templates_dir.join(format!("{name}.toml"));
        let spec = Self::load_from_file(&path)?;

        if spec.name != name {
            tracing::warn!(
                path = %path.display(),
                declared = %spec.name,
                requested = %name,
                "Template name differs from its file name"
            );
        }

        Ok(spec)
    }
}
