use std::cmp::Ordering;
use std::sync::Arc;

use tracing::trace;

use super::{check_values, import_all, invoke_failure, parameter_import, BuildPlan, MemberProcessor};
use crate::context::PipelineContext;
use crate::contract::Contract;
use crate::error::{ResolutionError, ResolutionErrorKind};
use crate::injection::{InjectionMember, InjectionValue};
use crate::pipeline::Stage;
use crate::types::{ConstructorInfo, ParameterInfo, TypeKind};

/// Select a constructor and create the instance under construction
pub(crate) struct ConstructorProcessor;

/// Complexity rank of a constructor: parameters with a default value, sequences or generic
/// types make it preferable, a by-ref parameter disqualifies it
pub(crate) fn rank(constructor: &ConstructorInfo) -> i32 {
    constructor
        .parameters()
        .iter()
        .map(|p| {
            if p.is_by_ref() {
                return -1000;
            }
            let ty = p.ty();
            let sequence = matches!(ty.kind(), TypeKind::Array | TypeKind::Enumerable);
            if p.has_default() || sequence || ty.generic_definition_of().is_some() {
                1
            } else {
                0
            }
        })
        .sum()
}

/// Most parameters first, then by decreasing rank. Ties keep the declaration order.
pub(crate) fn sort(constructors: &[ConstructorInfo]) -> Vec<&ConstructorInfo> {
    let mut sorted: Vec<_> = constructors.iter().collect();
    sorted.sort_by(|a, b| match b.parameters().len().cmp(&a.parameters().len()) {
        Ordering::Equal => rank(b).cmp(&rank(a)),
        other => other,
    });
    sorted
}

fn satisfiable(plan: &BuildPlan<'_>, parameter: &ParameterInfo) -> bool {
    if parameter.is_by_ref() {
        return false;
    }
    if parameter.has_default() {
        return true;
    }
    let annotation = parameter.annotation();
    if annotation.map(|a| a.optional).unwrap_or(false) {
        return true;
    }
    let contract = Contract::with_shared_name(parameter.ty(), annotation.and_then(|a| a.name.clone()));
    plan.container.can_resolve(&contract)
}

impl ConstructorProcessor {
    fn select<'p>(
        &self,
        plan: &BuildPlan<'p>,
    ) -> Result<(&'p ConstructorInfo, Option<Vec<InjectionValue>>), ResolutionError> {
        let constructors = plan.ty.constructors();
        let fail = |kind| ResolutionError::new(plan.contract, kind);
        if constructors.is_empty() {
            return Err(fail(ResolutionErrorKind::NoConstructor(plan.ty.name().to_string())));
        }

        let explicit = plan.members.iter().find_map(|m| match m {
            InjectionMember::Constructor(values) => Some(values),
            _ => None,
        });
        if let Some(values) = explicit {
            let mut mismatch = None;
            for constructor in constructors {
                let owner = constructor.signature(plan.ty.name());
                match check_values(&owner, constructor.parameters(), values) {
                    Ok(()) => return Ok((constructor, Some(values.clone()))),
                    Err(reason) => mismatch = mismatch.or(Some(reason)),
                }
            }
            return Err(match mismatch {
                Some((member, reason)) if constructors.len() == 1 => {
                    fail(ResolutionErrorKind::IncompatibleInjection { member, reason })
                }
                _ => fail(ResolutionErrorKind::NoConstructor(format!(
                    "{} with {:?}",
                    plan.ty.name(),
                    values
                ))),
            });
        }

        if let Some(preferred) = constructors.iter().find(|c| c.is_preferred()) {
            return Ok((preferred, None));
        }

        sort(constructors)
            .into_iter()
            .find(|c| c.parameters().iter().all(|p| satisfiable(plan, p)))
            .map(|c| (c, None))
            .ok_or_else(|| {
                let candidates: Vec<_> = constructors
                    .iter()
                    .map(|c| c.signature(plan.ty.name()))
                    .collect();
                fail(ResolutionErrorKind::NoConstructor(candidates.join(", ")))
            })
    }
}

impl MemberProcessor for ConstructorProcessor {
    fn stage(&self, plan: &BuildPlan<'_>) -> Result<Option<Stage>, ResolutionError> {
        let (constructor, values) = self.select(plan)?;
        let signature = constructor.signature(plan.ty.name());
        trace!(%signature, "selected constructor");

        let mut values = values.map(Vec::into_iter);
        let imports: Vec<_> = constructor
            .parameters()
            .iter()
            .map(|p| {
                let value = values.as_mut().and_then(|v| v.next());
                parameter_import(p, plan.ty, &signature, value)
            })
            .collect();

        let constructor = constructor.clone();
        Ok(Some(Arc::new(move |context: &mut PipelineContext<'_>| {
            let Some(values) = import_all(context, &imports) else {
                return;
            };
            match constructor.invoke(values) {
                Ok(instance) => context.target = Some(instance),
                Err(error) => {
                    let error = invoke_failure(context.contract(), &signature, error);
                    context.fail_with(error);
                }
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::InvokeError;
    use crate::types::{Invoker, Type};

    struct Unit;

    fn invoker() -> Invoker {
        Arc::new(|_| Err(InvokeError::Missing("unused".into())))
    }

    fn unit() -> Type {
        Type::value::<Unit>("Unit")
    }

    fn constructor(parameters: Vec<ParameterInfo>) -> ConstructorInfo {
        ConstructorInfo::new(parameters, invoker())
    }

    #[test]
    fn ranks_parameters() {
        let plain = constructor(vec![ParameterInfo::new("a", unit())]);
        assert_eq!(rank(&plain), 0);
        let richer = constructor(vec![
            ParameterInfo::new("a", unit()).with_default(crate::types::DefaultValue::Null),
            ParameterInfo::new("b", Type::enumerable(unit())),
        ]);
        assert_eq!(rank(&richer), 2);
        let by_ref = constructor(vec![ParameterInfo::new("a", unit()).by_ref()]);
        assert_eq!(rank(&by_ref), -1000);
    }

    #[test]
    fn sorts_by_arity_then_rank() {
        let constructors = vec![
            constructor(vec![ParameterInfo::new("a", unit())]),
            constructor(vec![
                ParameterInfo::new("a", unit()).by_ref(),
                ParameterInfo::new("b", unit()),
            ]),
            constructor(vec![
                ParameterInfo::new("a", unit()),
                ParameterInfo::new("b", unit()),
                ParameterInfo::new("c", unit()),
            ]),
            constructor(vec![ParameterInfo::new("a", unit()), ParameterInfo::new("b", unit())]),
        ];
        let sorted: Vec<_> = sort(&constructors)
            .into_iter()
            .map(|c| (c.parameters().len(), rank(c)))
            .collect();
        assert_eq!(sorted, vec![(3, 0), (2, 0), (2, -1000), (1, 0)]);
    }
}
