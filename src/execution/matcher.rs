//! Event matcher - decides which pipelines an event activates

use crate::core::pipeline::PipelineDefinition;
use crate::core::trigger::RepositoryEvent;
use tracing::debug;

/// Stateless selector over loaded pipelines
pub struct EventMatcher;

impl EventMatcher {
    /// Every pipeline with at least one trigger matching `event`, in input
    /// order. A pipeline without triggers is never selected.
    pub fn select<'a, P>(pipelines: &'a [P], event: &RepositoryEvent) -> Vec<&'a P>
    where
        P: AsRef<PipelineDefinition>,
    {
        pipelines
            .iter()
            .filter(|p| {
                let definition = p.as_ref();
                let active = definition.activates_on(event);
                debug!(
                    "Pipeline '{}' {} on {} event",
                    definition.name,
                    if active { "activates" } else { "ignores" },
                    event.kind
                );
                active
            })
            .collect()
    }
}
