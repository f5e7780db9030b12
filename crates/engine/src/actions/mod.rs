//! Action item behaviours.
//!
//! Each submodule adds the handling of one family of items to the pass.
//! Handlers never fail: problems are recorded and reported as
//! [`Effect::Continue`].

mod dispatch;
mod interactive;
mod jump;
mod message;
mod notify;
mod roles;

pub use dispatch::rule_matches;

use crate::context::SubstitutionContext;
use crate::executor::Pass;
use crate::jobs::RoleOperation;
use crate::models::{ActionItem, ActionKind, Record, StatusId, TriggerOrigin};

/// What an automatic item asks the loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    Continue,
    Jump {
        target: StatusId,
        mark: bool,
        origin: TriggerOrigin,
    },
}

impl Pass<'_> {
    pub(crate) fn perform(
        &mut self,
        record: &mut Record,
        item: &ActionItem,
        ctx: &SubstitutionContext,
    ) -> Effect {
        match &item.kind {
            ActionKind::Jump(jump) => self.perform_jump(record, jump),
            ActionKind::Dispatch(dispatch) => self.perform_dispatch(record, item, dispatch, ctx),
            ActionKind::Notify(notify) => self.perform_notify(record, item, notify, ctx),
            ActionKind::AddRole(change) => {
                self.perform_role_change(record, item, change, RoleOperation::Add, ctx)
            }
            ActionKind::RemoveRole(change) => {
                self.perform_role_change(record, item, change, RoleOperation::Remove, ctx)
            }
            // Presentation only, or interactive.
            ActionKind::DisplayMessage(_) | ActionKind::Choice(_) | ActionKind::Editable(_) => {
                Effect::Continue
            }
        }
    }
}
