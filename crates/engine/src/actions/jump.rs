use crate::executor::Pass;
use crate::models::{Jump, JumpMode, Record, TriggerOrigin};

use super::Effect;

impl Pass<'_> {
    /// Trigger-mode jumps never fire here; they wait for
    /// [`crate::Engine::trigger`].
    pub(crate) fn perform_jump(&self, record: &Record, jump: &Jump) -> Effect {
        let origin = match &jump.mode {
            JumpMode::Immediate => self.exec.origin,
            JumpMode::Trigger { .. } => return Effect::Continue,
            JumpMode::Timeout { seconds } => {
                let elapsed = self.exec.now - record.last_update;
                if elapsed.num_seconds() < *seconds {
                    return Effect::Continue;
                }
                TriggerOrigin::Timeout
            }
        };
        Effect::Jump {
            target: jump.target.clone(),
            mark: jump.mark,
            origin,
        }
    }
}
