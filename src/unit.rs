//! JSON compilation units
//!
//! A unit bundles a graph with the profiling snapshot taken for it, which is
//! everything the phase reads. The `dfg-fixup` binary and the integration
//! tests exchange graphs in this form.

use crate::config::FixupConfig;
use crate::error::{Error, Result};
use crate::fixup::{FixupPhase, FixupStats};
use crate::ir::Graph;
use crate::profiling::ProfileSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub graph: Graph,
    #[serde(default)]
    pub profile: ProfileSnapshot,
}

impl CompilationUnit {
    pub fn new(graph: Graph, profile: ProfileSnapshot) -> Self {
        Self { graph, profile }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let unit = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            nodes = unit.graph.node_count(),
            blocks = unit.graph.num_blocks(),
            "loaded compilation unit"
        );
        Ok(unit)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the graph, then run the fixup phase over it
    ///
    /// Validation errors are returned; the phase itself never fails.
    pub fn fixup(&mut self, config: &FixupConfig) -> Result<FixupStats> {
        config.validate()?;
        self.graph.validate()?;
        let mut phase = FixupPhase::with_config(&mut self.graph, &self.profile, config.clone());
        phase.run();
        Ok(phase.stats().clone())
    }
}
