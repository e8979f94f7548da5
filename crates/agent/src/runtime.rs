use std::sync::Arc;
use std::time::Duration;

use hiredrill_core::config::AppConfig;

use crate::guardrails::GuardrailEngine;
use crate::invoke::AgentInvoker;
use crate::llm::LlmClient;
use crate::prompts::AgentCatalog;
use crate::registry::TaskRegistry;

/// Per-pipeline limits, resolved once from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub research_timeout: Duration,
    pub drill_timeout: Duration,
    pub evaluation_timeout: Duration,
    pub analysis_timeout: Duration,
    pub max_searches: usize,
    pub generator_count: usize,
    pub max_repos: usize,
    pub batch_size: usize,
    pub max_daily_analyses: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            research_timeout: config.agents.research_timeout(),
            drill_timeout: config.agents.drill_timeout(),
            evaluation_timeout: config.agents.evaluation_timeout(),
            analysis_timeout: config.scout.analysis_timeout(),
            max_searches: config.agents.max_searches.max(1),
            generator_count: config.agents.generator_count.clamp(1, 3),
            max_repos: config.scout.max_repos,
            batch_size: config.scout.batch_size.max(1),
            max_daily_analyses: config.scout.max_daily_analyses,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Everything a pipeline needs: the invocation chokepoint, the agent catalog and its limits.
pub struct AgentRuntime {
    invoker: AgentInvoker,
    catalog: AgentCatalog,
    settings: PipelineSettings,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<TaskRegistry>, config: &AppConfig) -> Self {
        let catalog = AgentCatalog::new(&config.llm, config.agents.max_searches);
        Self::with_parts(llm, registry, catalog, PipelineSettings::from_config(config))
    }

    pub fn with_parts(
        llm: Arc<dyn LlmClient>,
        registry: Arc<TaskRegistry>,
        catalog: AgentCatalog,
        settings: PipelineSettings,
    ) -> Self {
        let guardrails = GuardrailEngine::new(
            llm.clone(),
            catalog.injection_classifier.clone(),
            catalog.leakage_classifier.clone(),
        );
        Self { invoker: AgentInvoker::new(llm, registry, guardrails), catalog, settings }
    }

    pub fn invoker(&self) -> &AgentInvoker {
        &self.invoker
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        self.invoker.registry()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hiredrill_core::config::AppConfig;

    use super::{AgentRuntime, PipelineSettings};
    use crate::registry::TaskRegistry;
    use crate::scripted::ScriptedLlm;

    #[test]
    fn settings_follow_configuration() {
        let mut config = AppConfig::default();
        config.agents.research_timeout_secs = 7;
        config.agents.generator_count = 2;
        config.scout.batch_size = 0;

        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.research_timeout, Duration::from_secs(7));
        assert_eq!(settings.generator_count, 2);
        assert_eq!(settings.batch_size, 1);
    }

    #[test]
    fn runtime_shares_the_injected_registry() {
        let registry = Arc::new(TaskRegistry::new());
        let runtime =
            AgentRuntime::new(Arc::new(ScriptedLlm::new()), registry.clone(), &AppConfig::default());
        assert!(Arc::ptr_eq(runtime.registry(), &registry));
        assert_eq!(runtime.settings().max_searches, 2);
    }
}
