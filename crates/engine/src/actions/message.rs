use tracing::debug;

use crate::context::SubstitutionContext;
use crate::executor::{DisplayedMessage, Pass};
use crate::failures::FailureKind;
use crate::models::{ActionKind, Record, Status};

impl Pass<'_> {
    /// Render the display messages of a status for the acting user.
    ///
    /// Messages never run during a pass; this is a read-only query.
    pub(crate) fn display_messages(
        &mut self,
        record: &Record,
        status: &Status,
        ctx: &SubstitutionContext,
    ) -> Vec<DisplayedMessage> {
        let mut messages = Vec::new();
        for item in &status.items {
            let ActionKind::DisplayMessage(message) = &item.kind else {
                continue;
            };
            if !self.is_authorised(record, &message.to) || !self.condition_holds(record, item, ctx)
            {
                continue;
            }
            match self.engine.evaluator.render_text(&message.template, ctx) {
                Ok(text) if text.trim().is_empty() => {
                    debug!(item = %item.id, "message rendered empty");
                }
                Ok(text) => messages.push(DisplayedMessage {
                    item: item.id.clone(),
                    level: message.level.unwrap_or_default(),
                    text,
                }),
                Err(error) => {
                    let site = self.site(record, Some(item.id.as_str()));
                    self.fail(&site, FailureKind::TemplateFailed, &error.to_string());
                }
            }
        }
        messages
    }
}
