use std::sync::Arc;

use tracing::trace;

use super::{Pipeline, Stage};
use crate::context::PipelineContext;

/// Turn an ordered list of stages into an executable pipeline.
///
/// Both implementations stop at the first stage leaving the context faulted.
pub trait PipelineExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn build(&self, stages: Vec<Stage>) -> Pipeline;
}

/// Interpreted execution: the stage list is walked on every run
#[derive(Clone, Copy, Debug, Default)]
pub struct Activated;

impl PipelineExecutor for Activated {
    fn name(&self) -> &'static str {
        "activated"
    }

    fn build(&self, stages: Vec<Stage>) -> Pipeline {
        trace!(stages = stages.len(), "activated pipeline");
        let stages: Arc<[Stage]> = stages.into();
        Pipeline::new(move |context| {
            for stage in stages.iter() {
                stage(context);
                if context.is_faulted() {
                    break;
                }
            }
        })
    }
}

/// Compiled execution: each stage directly calls the next one
#[derive(Clone, Copy, Debug, Default)]
pub struct Compiled;

impl PipelineExecutor for Compiled {
    fn name(&self) -> &'static str {
        "compiled"
    }

    fn build(&self, stages: Vec<Stage>) -> Pipeline {
        trace!(stages = stages.len(), "compiled pipeline");
        let mut stages = stages.into_iter().rev();
        let Some(mut chain) = stages.next() else {
            return Pipeline::new(|_| {});
        };
        for stage in stages {
            let next = chain;
            chain = Arc::new(move |context: &mut PipelineContext<'_>| {
                stage(context);
                if !context.is_faulted() {
                    next(context);
                }
            });
        }
        Pipeline::from_stage(chain)
    }
}
