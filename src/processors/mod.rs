//! Member processors: turn the metadata of the built type and the injection configuration of
//! the registration into pipeline stages.
//!
//! The constructor stage creates the instance under construction, the field, property and
//! method stages complete it, and the final seal stage wraps it into a shared [Object].

use std::sync::Arc;

use crate::container::Container;
use crate::context::{ImportInfo, MemberKind, PipelineContext};
use crate::contract::Contract;
use crate::error::{InvokeError, ResolutionError, ResolutionErrorKind};
use crate::injection::{InjectionMember, InjectionValue};
use crate::object::Object;
use crate::pipeline::{BuildStage, Stage};
use crate::types::{ParameterInfo, Type};

mod constructor;
mod field;
mod method;

pub(crate) use constructor::ConstructorProcessor;
pub(crate) use field::{FieldProcessor, PropertyProcessor};
pub(crate) use method::MethodProcessor;

/// Everything a processor needs to know about the type to build
pub(crate) struct BuildPlan<'a> {
    pub container: &'a Container,
    pub contract: &'a Contract,
    pub ty: &'a Type,
    pub members: &'a [InjectionMember],
}

pub(crate) trait MemberProcessor {
    /// Stage for the members handled by this processor, if there is anything to do
    fn stage(&self, plan: &BuildPlan<'_>) -> Result<Option<Stage>, ResolutionError>;
}

/// All stages building an instance of `plan.ty`
pub(crate) fn build_stages(
    plan: &BuildPlan<'_>,
    enabled: &[BuildStage],
) -> Result<Vec<Stage>, ResolutionError> {
    let mut processors: Vec<&dyn MemberProcessor> = vec![&ConstructorProcessor];
    for stage in BuildStage::ALL {
        if !enabled.contains(&stage) {
            continue;
        }
        match stage {
            BuildStage::Fields => processors.push(&FieldProcessor),
            BuildStage::Properties => processors.push(&PropertyProcessor),
            BuildStage::Methods => processors.push(&MethodProcessor),
        }
    }

    let mut stages = Vec::with_capacity(processors.len() + 1);
    for processor in processors {
        if let Some(stage) = processor.stage(plan)? {
            stages.push(stage);
        }
    }
    stages.push(seal_stage(plan.ty.clone()));
    Ok(stages)
}

fn seal_stage(ty: Type) -> Stage {
    Arc::new(move |context: &mut PipelineContext<'_>| {
        let Some(instance) = context.target.take() else {
            context.fail(ResolutionErrorKind::NotResolvable);
            return;
        };
        match ty.seal(instance) {
            Some(object) => context.existing = Some(object),
            None => context.fail(ResolutionErrorKind::NotAssignable {
                from: "instance under construction".into(),
                to: ty.name().to_string(),
            }),
        }
    })
}

/// Import of a constructor or method parameter
pub(crate) fn parameter_import(
    parameter: &ParameterInfo,
    declaring: &Type,
    owner: &str,
    value: Option<InjectionValue>,
) -> ImportInfo {
    let annotation = parameter.annotation();
    let ty = parameter.ty();
    let contract =
        Contract::with_shared_name(ty.clone(), annotation.and_then(|a| a.name.clone()));
    let optional = annotation.map(|a| a.optional).unwrap_or(false);
    ImportInfo::new(MemberKind::Parameter, parameter.name(), ty, declaring.clone(), contract)
        .with_value(value)
        .with_default(
            parameter.has_default() || optional,
            parameter.default().clone(),
        )
        .with_description(format!("parameter `{}` of {}", parameter.name(), owner))
}

/// Check explicit values against the parameters they are supplied for
pub(crate) fn check_values(
    owner: &str,
    parameters: &[ParameterInfo],
    values: &[InjectionValue],
) -> Result<(), (String, String)> {
    if parameters.len() != values.len() {
        return Err((
            owner.to_string(),
            format!("{} values for {} parameters", values.len(), parameters.len()),
        ));
    }
    for (parameter, value) in parameters.iter().zip(values) {
        value
            .check(&parameter.ty())
            .map_err(|reason| (format!("parameter `{}` of {}", parameter.name(), owner), reason))?;
    }
    Ok(())
}

/// Resolve the values of a list of imports, `None` if the context became faulted
pub(crate) fn import_all(
    context: &mut PipelineContext<'_>,
    imports: &[ImportInfo],
) -> Option<Vec<Option<Object>>> {
    let mut values = Vec::with_capacity(imports.len());
    for import in imports {
        match context.import(import) {
            Ok(value) => values.push(value),
            Err(error) => {
                context.fail_with(error);
                return None;
            }
        }
    }
    Some(values)
}

/// Map the failure of a member invoker to a resolution error
pub(crate) fn invoke_failure(contract: &Contract, member: &str, error: InvokeError) -> ResolutionError {
    match error {
        InvokeError::Failed(source) => ResolutionError::construction(contract, source),
        other => ResolutionError::new(
            contract,
            ResolutionErrorKind::IncompatibleInjection {
                member: member.to_string(),
                reason: other.to_string(),
            },
        ),
    }
}
