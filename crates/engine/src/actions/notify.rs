use serde_json::json;
use tracing::debug;

use providers::Channel;

use crate::context::SubstitutionContext;
use crate::executor::Pass;
use crate::failures::FailureKind;
use crate::jobs::AfterJob;
use crate::models::{ActionItem, Notify, Record};
use crate::roles::flatten;

use super::Effect;

impl Pass<'_> {
    /// Send, or defer, a notification.
    ///
    /// SMS recipients are the rendered values themselves. Webservice
    /// recipients are role specs expanded to reachable users, addressed by
    /// their first name identifier (or id).
    pub(crate) fn perform_notify(
        &mut self,
        record: &Record,
        item: &ActionItem,
        notify: &Notify,
        ctx: &SubstitutionContext,
    ) -> Effect {
        let site = self.site(record, Some(item.id.as_str()));
        let engine = self.engine;

        let recipients: Vec<String> = match notify.channel {
            Channel::Sms => match engine.evaluator.render(&notify.recipients_template, ctx) {
                Ok(rendered) => {
                    let mut values = Vec::new();
                    flatten(&rendered, true, &mut values);
                    values
                }
                Err(error) => {
                    self.fail(&site, FailureKind::TemplateFailed, &error.to_string());
                    return Effect::Continue;
                }
            },
            Channel::Webservice => {
                let resolver = self.resolver(record).split_commas();
                let roles = resolver.resolve_lenient(&notify.recipients_template, ctx, |miss| {
                    self.record_miss(&site, miss)
                });
                resolver
                    .users_of(&roles)
                    .into_iter()
                    .filter(|user| user.is_reachable())
                    .map(|user| user.name_ids.first().cloned().unwrap_or(user.id))
                    .collect()
            }
        };

        if recipients.is_empty() {
            debug!(item = %item.id, "no recipients, notification skipped");
            return Effect::Continue;
        }

        let body = match engine.evaluator.render_text(&notify.body_template, ctx) {
            Ok(body) => body,
            Err(error) => {
                self.fail(&site, FailureKind::TemplateFailed, &error.to_string());
                return Effect::Continue;
            }
        };
        let metadata = json!({
            "workflow_id": record.workflow_id,
            "record_id": record.id,
            "status_id": record.status,
            "action_id": item.id,
            "title": notify.title,
        });

        if engine.config.defer_notifications {
            self.after_jobs.push(AfterJob::Notify {
                site,
                channel: notify.channel,
                recipients,
                body,
                metadata,
            });
        } else if let Err(error) = engine
            .notifier
            .notify(notify.channel, &recipients, &body, &metadata)
        {
            self.fail(&site, FailureKind::NotifyFailed, &error.to_string());
        }
        Effect::Continue
    }
}
