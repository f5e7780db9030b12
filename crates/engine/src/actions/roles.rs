use tracing::debug;

use crate::context::SubstitutionContext;
use crate::executor::Pass;
use crate::failures::FailureKind;
use crate::jobs::{AfterJob, RoleOperation};
use crate::models::{ActionItem, Record, RoleChange, RoleChangeMode};
use crate::roles::user_of_role;

use super::Effect;

impl Pass<'_> {
    /// Grant or revoke roles of the record's submitter.
    ///
    /// The local change is applied at once. In propagate mode, users known
    /// to the identity provider also get a sync after-job.
    pub(crate) fn perform_role_change(
        &mut self,
        record: &Record,
        item: &ActionItem,
        change: &RoleChange,
        operation: RoleOperation,
        ctx: &SubstitutionContext,
    ) -> Effect {
        let Some(user_id) = record.submitter.as_deref() else {
            debug!(item = %item.id, "record has no submitter, role change skipped");
            return Effect::Continue;
        };
        let site = self.site(record, Some(item.id.as_str()));
        let resolver = self.resolver(record);
        let roles = resolver.resolve_lenient(&change.role_spec, ctx, |miss| {
            self.record_miss(&site, miss)
        });
        let name_ids = self
            .engine
            .directory
            .user(user_id)
            .map(|user| user.name_ids)
            .unwrap_or_default();

        for role in roles.iter().filter(|role| user_of_role(role).is_none()) {
            let applied = match operation {
                RoleOperation::Add => resolver.add(user_id, role),
                RoleOperation::Remove => resolver.remove(user_id, role),
            };
            if let Err(error) = applied {
                self.fail(&site, FailureKind::DirectoryFailed, &error.to_string());
                continue;
            }

            if change.mode == RoleChangeMode::Propagate && !name_ids.is_empty() {
                self.after_jobs.push(AfterJob::SyncRole {
                    site: site.clone(),
                    user_id: user_id.to_string(),
                    name_ids: name_ids.clone(),
                    role_id: role.clone(),
                    operation,
                });
            }
        }
        Effect::Continue
    }
}
