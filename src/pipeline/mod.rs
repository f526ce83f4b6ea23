//! Resolution pipelines: the cached sequence of stages producing an instance for a registration.

use std::fmt;
use std::sync::Arc;

use crate::context::PipelineContext;

mod executor;

pub use executor::{Activated, Compiled, PipelineExecutor};

/// One step of a pipeline. Failures are recorded in the context.
pub type Stage = Arc<dyn Fn(&mut PipelineContext<'_>) + Send + Sync>;

/// Executable pipeline of a registration
#[derive(Clone)]
pub struct Pipeline(Stage);

impl Pipeline {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut PipelineContext<'_>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn from_stage(stage: Stage) -> Self {
        Self(stage)
    }

    pub fn execute(&self, context: &mut PipelineContext<'_>) {
        (self.0)(context)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pipeline")
    }
}

/// Execution strategy of the pipelines built by a container
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BuildMode {
    /// Run the stages in a loop, checking for failures between stages
    Activated,
    /// Fold the stages into a single nested closure when the pipeline is built
    #[default]
    Compiled,
}

impl BuildMode {
    pub fn executor(self) -> &'static dyn PipelineExecutor {
        static ACTIVATED: Activated = Activated;
        static COMPILED: Compiled = Compiled;
        match self {
            BuildMode::Activated => &ACTIVATED,
            BuildMode::Compiled => &COMPILED,
        }
    }
}

/// Optional injection stages run after the constructor
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BuildStage {
    Fields,
    Properties,
    Methods,
}

impl BuildStage {
    pub const ALL: [BuildStage; 3] = [BuildStage::Fields, BuildStage::Properties, BuildStage::Methods];
}
