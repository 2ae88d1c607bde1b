//! Command registry
//!
//! Built once at startup through [`RegistryBuilder`], read-only afterwards.

use crate::command::LifecycleCommand;
use crate::error::{LookupError, Result, SpecError};
use crate::gateway::ProviderGateway;
use crate::result::ExecutionResult;
use std::collections::BTreeMap;

/// Append-only builder; a second registration of the same verb fails
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    commands: BTreeMap<(String, String), LifecycleCommand>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        provider: &str,
        verb: &str,
        command: LifecycleCommand,
    ) -> std::result::Result<Self, SpecError> {
        let key = (provider.to_string(), verb.to_string());
        if self.commands.contains_key(&key) {
            return Err(SpecError::DuplicateCommand {
                provider: provider.to_string(),
                verb: verb.to_string(),
            });
        }
        tracing::trace!("Registered {} {}", provider, verb);
        self.commands.insert(key, command);
        Ok(self)
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            commands: self.commands,
        }
    }
}

/// Maps (provider, verb) to the command implementing it
#[derive(Debug)]
pub struct CommandRegistry {
    commands: BTreeMap<(String, String), LifecycleCommand>,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn resolve(
        &self,
        provider: &str,
        verb: &str,
    ) -> std::result::Result<&LifecycleCommand, LookupError> {
        self.commands
            .get(&(provider.to_string(), verb.to_string()))
            .ok_or_else(|| LookupError {
                provider: provider.to_string(),
                verb: verb.to_string(),
            })
    }

    /// Commands of one provider, sorted by verb
    pub fn commands<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a LifecycleCommand> {
        self.commands
            .iter()
            .filter(move |((p, _), _)| p == provider)
            .map(|(_, command)| command)
    }

    /// Distinct provider names, sorted
    pub fn providers(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = self.commands.keys().map(|(p, _)| p.as_str()).collect();
        providers.dedup();
        providers
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Resolve `verb` for the gateway's provider and run it on `tokens`.
    ///
    /// An unknown verb becomes a lookup failure result rather than an error.
    pub async fn invoke<S: AsRef<str> + Sync>(
        &self,
        gateway: &dyn ProviderGateway,
        verb: &str,
        tokens: &[S],
    ) -> Result<ExecutionResult> {
        match self.resolve(gateway.name(), verb) {
            Ok(command) => command.run_tokens(gateway, tokens).await,
            Err(e) => {
                tracing::warn!("{}", e);
                Ok(ExecutionResult::from_error(None, &e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Phases;
    use crate::result::FailureKind;
    use crate::testing::RecordingGateway;
    use crate::verbs;
    use async_trait::async_trait;

    struct Regions;

    #[async_trait]
    impl Phases for Regions {
        async fn execute(
            &self,
            invocation: &crate::command::Invocation<'_>,
            _target: Option<crate::command::Target>,
        ) -> Result<serde_json::Value> {
            Ok(invocation.gateway.get_regions().await?)
        }
    }

    fn regions() -> LifecycleCommand {
        LifecycleCommand::new(verbs::query(verbs::QUERY_REGIONS).unwrap(), Regions).unwrap()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let err = CommandRegistry::builder()
            .register("gcp", verbs::QUERY_REGIONS, regions())
            .unwrap()
            .register("gcp", verbs::QUERY_REGIONS, regions())
            .unwrap_err();

        assert_eq!(
            err,
            SpecError::DuplicateCommand {
                provider: "gcp".into(),
                verb: verbs::QUERY_REGIONS.into()
            }
        );
    }

    #[test]
    fn test_same_verb_for_two_providers() {
        let registry = CommandRegistry::builder()
            .register("gcp", verbs::QUERY_REGIONS, regions())
            .unwrap()
            .register("aws", verbs::QUERY_REGIONS, regions())
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.providers(), vec!["aws", "gcp"]);
        assert_eq!(registry.commands("gcp").count(), 1);
        assert!(registry.resolve("gcp", verbs::QUERY_REGIONS).is_ok());
    }

    #[test]
    fn test_resolve_unknown_verb() {
        let registry = CommandRegistry::builder().build();
        let err = registry.resolve("gcp", "instance explode").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No command 'instance explode' registered for provider 'gcp'"
        );
    }

    #[test]
    fn test_invoke_runs_resolved_command() {
        let registry = CommandRegistry::builder()
            .register("gcp", verbs::QUERY_REGIONS, regions())
            .unwrap()
            .build();
        let gateway =
            RecordingGateway::new().with_response("get_regions", serde_json::json!(["us-west1"]));

        let result = tokio_test::block_on(registry.invoke(
            &gateway,
            verbs::QUERY_REGIONS,
            &["--region", "us-west1"],
        ))
        .unwrap();
        assert_eq!(result.payload(), Some(&serde_json::json!(["us-west1"])));

        let missing =
            tokio_test::block_on(registry.invoke(&gateway, "query nothing", &[] as &[&str]))
                .unwrap();
        assert_eq!(missing.failure_details().unwrap().kind, FailureKind::Lookup);
        assert_eq!(missing.exit_code(), 2);
    }
}
