//! Deferred action scripts (`commit.bounty`, `publish.bounty`).
//!
//! Each script runs from the package directory and removes itself once its
//! work succeeded, so a leftover script always means pending work.

use super::DeferredAction;

pub const COMMIT_SCRIPT: &str = "commit.bounty";
pub const PUBLISH_SCRIPT: &str = "publish.bounty";

/// Placeholder in the publish command replaced by the new version.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// File name of the script carrying `action`.
#[must_use]
pub const fn file_name(action: &DeferredAction) -> &'static str {
    match action {
        DeferredAction::RecordVersion { .. } => COMMIT_SCRIPT,
        DeferredAction::Publish { .. } => PUBLISH_SCRIPT,
    }
}

/// Render the shell script for `action`.
#[must_use]
pub fn render(action: &DeferredAction, publish_command: &str) -> String {
    match action {
        DeferredAction::RecordVersion { message } => format!(
            "#!/bin/sh\n\n\
             git add ./\n\
             git reset ./{COMMIT_SCRIPT} ./{PUBLISH_SCRIPT}\n\
             git commit -m {} && rm ./{COMMIT_SCRIPT}\n",
            shell_quote(message)
        ),
        DeferredAction::Publish { version } => format!(
            "#!/bin/sh\n\n{} && rm ./{PUBLISH_SCRIPT}\n",
            publish_command.replace(VERSION_PLACEHOLDER, &version.to_string())
        ),
    }
}

/// Single-quote `value` for `sh`.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
