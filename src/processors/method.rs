use std::sync::Arc;

use super::{check_values, import_all, invoke_failure, parameter_import, BuildPlan, MemberProcessor};
use crate::context::{ImportInfo, PipelineContext};
use crate::error::{ResolutionError, ResolutionErrorKind};
use crate::injection::{InjectionMember, InjectionValue};
use crate::pipeline::Stage;
use crate::types::MethodInfo;

/// Call the injection methods on the instance under construction
pub(crate) struct MethodProcessor;

fn owner(plan: &BuildPlan<'_>, method: &MethodInfo) -> String {
    format!("{}::{}", plan.ty.name(), method.name())
}

impl MemberProcessor for MethodProcessor {
    fn stage(&self, plan: &BuildPlan<'_>) -> Result<Option<Stage>, ResolutionError> {
        let methods = plan.ty.methods();
        let mut selected: Vec<(MethodInfo, Option<Vec<InjectionValue>>)> = methods
            .iter()
            .filter(|m| m.is_injected())
            .map(|m| (m.clone(), None))
            .collect();

        for member in plan.members {
            let InjectionMember::Method(name, values) = member else {
                continue;
            };
            let mut candidates = methods.iter().filter(|m| m.name() == name).peekable();
            if candidates.peek().is_none() {
                return Err(ResolutionError::new(
                    plan.contract,
                    ResolutionErrorKind::MemberNotFound {
                        ty: plan.ty.name().to_string(),
                        member: name.clone(),
                    },
                ));
            }
            let mut mismatch = None;
            let mut matched = None;
            for method in candidates {
                match check_values(&owner(plan, method), method.parameters(), values) {
                    Ok(()) => {
                        matched = Some(method);
                        break;
                    }
                    Err(reason) => mismatch = mismatch.or(Some(reason)),
                }
            }
            let Some(method) = matched else {
                let (member, reason) = mismatch.unwrap_or_default();
                return Err(ResolutionError::new(
                    plan.contract,
                    ResolutionErrorKind::IncompatibleInjection { member, reason },
                ));
            };
            match selected
                .iter_mut()
                .find(|(m, _)| m.name() == method.name() && m.parameters().len() == values.len())
            {
                Some(entry) => entry.1 = Some(values.clone()),
                None => selected.push((method.clone(), Some(values.clone()))),
            }
        }

        if selected.is_empty() {
            return Ok(None);
        }

        let calls: Vec<(MethodInfo, String, Vec<ImportInfo>)> = selected
            .into_iter()
            .map(|(method, values)| {
                let owner = owner(plan, &method);
                let mut values = values.map(Vec::into_iter);
                let imports = method
                    .parameters()
                    .iter()
                    .map(|p| {
                        let value = values.as_mut().and_then(|v| v.next());
                        parameter_import(p, plan.ty, &owner, value)
                    })
                    .collect();
                (method, owner, imports)
            })
            .collect();

        Ok(Some(Arc::new(move |context: &mut PipelineContext<'_>| {
            for (method, owner, imports) in &calls {
                let Some(values) = import_all(context, imports) else {
                    return;
                };
                let Some(target) = context.target.as_mut() else {
                    return context.fail(ResolutionErrorKind::NotResolvable);
                };
                if let Err(error) = method.invoke(target.as_mut(), values) {
                    let error = invoke_failure(context.contract(), owner, error);
                    return context.fail_with(error);
                }
            }
        })))
    }
}
