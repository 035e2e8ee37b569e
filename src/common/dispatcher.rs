//! Routes inbound shell commands to the lifecycle controller

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::common::ipc::{Reply, ShellCommand, SignalSink};
use crate::error::Result;
use crate::profile::ProfileLifecycleController;

fn reply<T: Serialize>(result: Result<T>) -> Reply {
    match result {
        Ok(value) => Reply::success(&value),
        Err(e) => {
            if e.is_recoverable() {
                debug!(kind = e.kind(), error = %e, "Command rejected");
            } else {
                warn!(kind = e.kind(), error = %e, "Command failed");
            }
            Reply::failure(&e)
        }
    }
}

pub fn dispatch<S: SignalSink>(controller: &ProfileLifecycleController<S>, command: ShellCommand) -> Reply {
    match command {
        ShellCommand::GetEffectiveSettings => Reply::success(&controller.effective_settings()),
        ShellCommand::SaveActiveSettings { settings } => {
            reply(controller.save_active_settings(&settings))
        }
        ShellCommand::CreateProfile { name } => reply(controller.create_profile(&name)),
        ShellCommand::SwitchProfile { identity } => reply(controller.switch_profile(&identity)),
        ShellCommand::RenameProfile { old, new } => reply(controller.rename_profile(&old, &new)),
        ShellCommand::DeleteProfile { identity } => reply(controller.delete_profile(&identity)),
        ShellCommand::RecordUrl { url } => reply(controller.record_url(&url).map(|_| ())),
        ShellCommand::ResetSession => reply(controller.reset_session()),
        ShellCommand::CreateBackup => reply(
            controller
                .create_backup()
                .map(|path| json!({ "path": path })),
        ),
        ShellCommand::ListBackups => reply(controller.list_backups()),
        ShellCommand::RestoreBackup { filename } => reply(controller.restore_backup(&filename)),
        ShellCommand::DeleteBackup { filename } => reply(controller.delete_backup(&filename)),
        ShellCommand::PruneBackups { keep } => reply(
            controller
                .prune_backups(keep)
                .map(|removed| json!({ "removed": removed })),
        ),
    }
}
