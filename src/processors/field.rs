use std::sync::Arc;

use super::{invoke_failure, BuildPlan, MemberProcessor};
use crate::context::{ImportInfo, MemberKind, PipelineContext};
use crate::contract::Contract;
use crate::error::{ResolutionError, ResolutionErrorKind};
use crate::injection::{InjectionMember, InjectionValue};
use crate::pipeline::Stage;
use crate::types::{DefaultValue, FieldInfo};

/// Inject the annotated and explicitly configured fields
pub(crate) struct FieldProcessor;

/// Same as [FieldProcessor] for properties
pub(crate) struct PropertyProcessor;

impl MemberProcessor for FieldProcessor {
    fn stage(&self, plan: &BuildPlan<'_>) -> Result<Option<Stage>, ResolutionError> {
        let explicit = plan.members.iter().filter_map(|m| match m {
            InjectionMember::Field(name, value) => Some((name.as_str(), value.clone())),
            _ => None,
        });
        setter_stage(plan, MemberKind::Field, plan.ty.fields(), explicit)
    }
}

impl MemberProcessor for PropertyProcessor {
    fn stage(&self, plan: &BuildPlan<'_>) -> Result<Option<Stage>, ResolutionError> {
        let explicit = plan.members.iter().filter_map(|m| match m {
            InjectionMember::Property(name, value) => Some((name.as_str(), value.clone())),
            _ => None,
        });
        setter_stage(plan, MemberKind::Property, plan.ty.properties(), explicit)
    }
}

fn setter_stage<'m>(
    plan: &BuildPlan<'_>,
    kind: MemberKind,
    members: &[FieldInfo],
    explicit: impl Iterator<Item = (&'m str, Option<InjectionValue>)>,
) -> Result<Option<Stage>, ResolutionError> {
    // annotated members, in declaration order
    let mut selected: Vec<(FieldInfo, Option<InjectionValue>)> = members
        .iter()
        .filter(|m| m.is_injectable() && m.annotation().is_some())
        .map(|m| (m.clone(), None))
        .collect();

    for (name, value) in explicit {
        let member = members
            .iter()
            .find(|m| m.name() == name && m.is_injectable())
            .ok_or_else(|| {
                ResolutionError::new(
                    plan.contract,
                    ResolutionErrorKind::MemberNotFound {
                        ty: plan.ty.name().to_string(),
                        member: name.to_string(),
                    },
                )
            })?;
        if let Some(value) = &value {
            value.check(&member.ty()).map_err(|reason| {
                ResolutionError::new(
                    plan.contract,
                    ResolutionErrorKind::IncompatibleInjection {
                        member: format!("{}.{}", plan.ty.name(), name),
                        reason,
                    },
                )
            })?;
        }
        match selected.iter_mut().find(|(m, _)| m.name() == name) {
            Some(entry) => entry.1 = value,
            None => selected.push((member.clone(), value)),
        }
    }

    if selected.is_empty() {
        return Ok(None);
    }

    let injections: Vec<(FieldInfo, ImportInfo)> = selected
        .into_iter()
        .map(|(member, value)| {
            let annotation = member.annotation().cloned().unwrap_or_default();
            let ty = member.ty();
            let contract = Contract::with_shared_name(ty.clone(), annotation.name.clone());
            let import = ImportInfo::new(kind, member.name(), ty, plan.ty.clone(), contract)
                .with_value(value)
                .with_default(annotation.optional, DefaultValue::Null);
            (member, import)
        })
        .collect();

    Ok(Some(Arc::new(move |context: &mut PipelineContext<'_>| {
        for (member, import) in &injections {
            let value = match context.import(import) {
                Ok(value) => value,
                Err(error) => return context.fail_with(error),
            };
            let Some(target) = context.target.as_mut() else {
                return context.fail(ResolutionErrorKind::NotResolvable);
            };
            if let Err(error) = member.assign(target.as_mut(), value) {
                let error = invoke_failure(context.contract(), import.description(), error);
                return context.fail_with(error);
            }
        }
    })))
}
