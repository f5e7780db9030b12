//! Dispatch: routing roles into a workflow function.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use expr::is_template;
use expr::value::{to_text, values_equal};
use providers::RoleId;

use crate::context::SubstitutionContext;
use crate::executor::Pass;
use crate::failures::FailureKind;
use crate::models::{ActionItem, Dispatch, DispatchMode, Record, RoleKey};
use crate::roles::{user_role, ResolveError};

use super::Effect;

/// Whether a computed dispatch value selects a rule.
///
/// A list matches when any element does. With `coercion`, a number and a
/// string match when their text forms are equal.
pub fn rule_matches(value: &Value, literal: &Value, coercion: bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|v| scalar_matches(v, literal, coercion)),
        _ => scalar_matches(value, literal, coercion),
    }
}

fn scalar_matches(value: &Value, literal: &Value, coercion: bool) -> bool {
    if values_equal(value, literal) {
        return true;
    }
    coercion
        && matches!(
            (value, literal),
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_))
        )
        && to_text(value) == to_text(literal)
}

pub(crate) fn apply_dispatch(
    buckets: &mut BTreeMap<RoleKey, BTreeSet<RoleId>>,
    key: &str,
    mode: &DispatchMode,
    roles: Vec<RoleId>,
) {
    match mode {
        DispatchMode::Set => {
            buckets.insert(key.to_string(), roles.into_iter().collect());
        }
        DispatchMode::Add => buckets.entry(key.to_string()).or_default().extend(roles),
        DispatchMode::Remove => {
            if let Some(bucket) = buckets.get_mut(key) {
                for role in &roles {
                    bucket.remove(role);
                }
                if bucket.is_empty() {
                    buckets.remove(key);
                }
            }
        }
    }
}

impl Pass<'_> {
    pub(crate) fn perform_dispatch(
        &mut self,
        record: &mut Record,
        item: &ActionItem,
        dispatch: &Dispatch,
        ctx: &SubstitutionContext,
    ) -> Effect {
        let roles = match &dispatch.variable {
            Some(variable) => self.automatic_roles(record, item, dispatch, variable, ctx),
            None => match &dispatch.role_spec {
                Some(spec) => self.manual_roles(record, item, spec, ctx),
                None => Vec::new(),
            },
        };

        if roles.is_empty() {
            return Effect::Continue;
        }
        debug!(key = %dispatch.role_key, ?roles, mode = ?dispatch.mode, "dispatching");
        apply_dispatch(
            &mut record.workflow_roles,
            &dispatch.role_key,
            &dispatch.mode,
            roles,
        );
        Effect::Continue
    }

    /// Compute the variable once; the first matching rule wins.
    fn automatic_roles(
        &mut self,
        record: &Record,
        item: &ActionItem,
        dispatch: &Dispatch,
        variable: &str,
        ctx: &SubstitutionContext,
    ) -> Vec<RoleId> {
        let site = self.site(record, Some(item.id.as_str()));
        let value = match self.engine.evaluator.evaluate_source(variable, ctx) {
            Ok(value) => value,
            Err(error) => {
                self.fail(
                    &site,
                    FailureKind::DispatchFailed,
                    &format!("cannot compute {variable:?}: {error}"),
                );
                return Vec::new();
            }
        };

        let coercion = self.engine.config.dispatch_coercion;
        let Some(rule) = dispatch
            .rules
            .iter()
            .find(|rule| rule_matches(&value, &rule.value, coercion))
        else {
            debug!(item = %item.id, %value, "no dispatch rule matched");
            return Vec::new();
        };

        let resolver = self.resolver(record);
        resolver.resolve_lenient(&rule.role, ctx, |miss| self.record_miss(&site, miss))
    }

    /// Resolve a single spec; values that are not roles may name a user.
    fn manual_roles(
        &mut self,
        record: &Record,
        item: &ActionItem,
        spec: &str,
        ctx: &SubstitutionContext,
    ) -> Vec<RoleId> {
        let site = self.site(record, Some(item.id.as_str()));
        let resolver = self.resolver(record);
        let values = match resolver.expand(spec, ctx) {
            Ok(values) => values,
            Err(miss) => {
                self.record_miss(&site, miss);
                return Vec::new();
            }
        };

        let template = is_template(spec).then_some(spec);
        let mut roles = Vec::new();
        for value in values {
            match resolver.resolve_one(&value, template) {
                Ok(found) => roles.extend(found),
                Err(miss @ ResolveError::MissingRole { .. }) => match resolver.find_user(&value) {
                    Some(user) => roles.push(user_role(&user.id)),
                    None => self.record_miss(&site, miss),
                },
                Err(miss) => self.record_miss(&site, miss),
            }
        }
        roles
    }
}
