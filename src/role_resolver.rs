//! Wires `RoleResolver` to the Organization Registry and the configured LLM
//! service registry. The wire format for an actual provider is out of scope
//! (the `LlmClient` trait models the contract only); callers construct the
//! concrete clients for each configured service and hand them in here.

use crate::config::ServiceRegistry;
use crate::dispatcher::RoleResolver;
use crate::domain_types::{LlmServiceId, RoleId};
use crate::llm_client::LlmClient;
use crate::registry::OrganizationRegistry;
use crate::tool_loop::RoleContext;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks roles up in the Organization Registry and their LLM client in a
/// caller-supplied client map, keyed by `LlmServiceId`.
pub struct ConfigRoleResolver {
    registry: OrganizationRegistry,
    services: ServiceRegistry,
    clients: HashMap<LlmServiceId, Arc<dyn LlmClient>>,
    base_prompt: String,
    tool_rules: String,
}

impl ConfigRoleResolver {
    /// Builds a resolver over the given registry, service config, and a
    /// pre-built map of service ID to client. Non-system roles get
    /// `base_prompt`/`tool_rules` prepended/appended to their own prompt;
    /// the `root`/`user` system roles never do.
    #[must_use]
    pub fn new(
        registry: OrganizationRegistry,
        services: ServiceRegistry,
        clients: HashMap<LlmServiceId, Arc<dyn LlmClient>>,
        base_prompt: String,
        tool_rules: String,
    ) -> Self {
        Self {
            registry,
            services,
            clients,
            base_prompt,
            tool_rules,
        }
    }
}

impl RoleResolver for ConfigRoleResolver {
    fn resolve(&self, role_id: RoleId) -> Option<RoleContext> {
        let role = self.registry.get_role(role_id)?;
        if !role.is_active() {
            return None;
        }

        let capabilities = self
            .services
            .get(&role.llm_service_id)
            .map(|entry| entry.capabilities.clone())
            .unwrap_or_default();

        if role.is_system() {
            return Some(RoleContext {
                base_prompt: None,
                role_prompt: role.role_prompt.clone(),
                tool_rules: None,
                tool_groups: role.tool_groups.clone(),
                capabilities,
            });
        }

        Some(RoleContext {
            base_prompt: Some(self.base_prompt.clone()),
            role_prompt: role.role_prompt.clone(),
            tool_rules: Some(self.tool_rules.clone()),
            tool_groups: role.tool_groups.clone(),
            capabilities,
        })
    }

    fn llm_client(&self, role_id: RoleId) -> Option<Arc<dyn LlmClient>> {
        let role = self.registry.get_role(role_id)?;
        self.clients.get(&role.llm_service_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{LlmServiceId, RoleName, TaskId};
    use crate::llm_client::test_double::ScriptedLlmClient;
    use std::collections::BTreeSet;

    #[test]
    fn system_roles_resolve_without_base_prompt() {
        let registry = OrganizationRegistry::new();
        registry.seed_task(TaskId::generate(), chrono::Utc::now());
        let services = ServiceRegistry::from_json("[]").unwrap();
        let clients = HashMap::new();
        let resolver =
            ConfigRoleResolver::new(registry, services, clients, "base".to_string(), "rules".to_string());

        let ctx = resolver.resolve(RoleId::root()).unwrap();
        assert!(ctx.base_prompt.is_none());
    }

    #[test]
    fn user_roles_get_base_prompt_and_rules() {
        let registry = OrganizationRegistry::new();
        registry.seed_task(TaskId::generate(), chrono::Utc::now());
        let role = registry
            .create_role(
                RoleName::try_new("worker").unwrap(),
                "prompt".to_string(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
                chrono::Utc::now(),
            )
            .unwrap();
        let services = ServiceRegistry::from_json("[]").unwrap();
        let mut clients: HashMap<LlmServiceId, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(
            LlmServiceId::try_new("svc").unwrap(),
            Arc::new(ScriptedLlmClient::new(vec![])),
        );
        let resolver = ConfigRoleResolver::new(
            registry,
            services,
            clients,
            "base".to_string(),
            "rules".to_string(),
        );

        let ctx = resolver.resolve(role.role_id).unwrap();
        assert_eq!(ctx.base_prompt.as_deref(), Some("base"));
        assert!(resolver.llm_client(role.role_id).is_some());
    }
}
