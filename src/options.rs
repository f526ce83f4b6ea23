use crate::pipeline::{BuildMode, BuildStage};

/// Behaviour of a container, fixed at construction and inherited by child containers
#[derive(Clone, Debug)]
pub struct ContainerOptions {
    /// Execution strategy of the resolution pipelines
    pub build_mode: BuildMode,
    /// Record the resolution path in errors
    pub diagnostics: bool,
    /// Injection stages run after construction
    pub stages: Vec<BuildStage>,
    /// Initial number of registrations the scope is sized for
    pub capacity: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            build_mode: BuildMode::default(),
            diagnostics: cfg!(debug_assertions),
            stages: BuildStage::ALL.to_vec(),
            capacity: 37,
        }
    }
}

impl ContainerOptions {
    pub fn with_build_mode(mut self, build_mode: BuildMode) -> Self {
        self.build_mode = build_mode;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_stages(mut self, stages: impl IntoIterator<Item = BuildStage>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}
