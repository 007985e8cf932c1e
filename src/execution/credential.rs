//! OS user and group lookup for local commands.
//!
//! Switching credentials requires root. On platforms without credential
//! switching the lookup is a no-op that logs a warning.

use thiserror::Error;

/// Errors raised while resolving run-as credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The daemon is not running as root.
    #[error(
        "cannot switch user of tasks without root privilege, if you need to use user in tasks run crontab as user root"
    )]
    NotRoot,

    /// No such user.
    #[error("cannot find user with name {0} in the os")]
    UnknownUser(String),

    /// No such group.
    #[error("cannot find group with name {0} in the os")]
    UnknownGroup(String),

    /// The lookup itself failed.
    #[error("credential lookup failed: {0}")]
    Lookup(String),
}

/// Numeric identity a command runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

/// Check that the configured user and group can be used.
pub fn validate(user: Option<&str>, group: Option<&str>) -> Result<(), CredentialError> {
    resolve(user, group).map(|_| ())
}

#[cfg(unix)]
/// Resolve `user` (and optionally `group`) to numeric ids.
///
/// Returns `None` when no user is configured. A group without a user is
/// ignored, matching the command runner.
pub fn resolve(
    user: Option<&str>,
    group: Option<&str>,
) -> Result<Option<Credentials>, CredentialError> {
    use nix::unistd::{Group, User, geteuid};

    let Some(user) = user.filter(|u| !u.is_empty()) else {
        if group.is_some_and(|g| !g.is_empty()) {
            tracing::debug!(?group, "group given without user, running as current user");
        }
        return Ok(None);
    };
    if !geteuid().is_root() {
        return Err(CredentialError::NotRoot);
    }

    let found = User::from_name(user)
        .map_err(|e| CredentialError::Lookup(e.to_string()))?
        .ok_or_else(|| CredentialError::UnknownUser(user.to_string()))?;
    let mut credentials = Credentials {
        uid: found.uid.as_raw(),
        gid: found.gid.as_raw(),
    };

    if let Some(group) = group.filter(|g| !g.is_empty()) {
        let found = Group::from_name(group)
            .map_err(|e| CredentialError::Lookup(e.to_string()))?
            .ok_or_else(|| CredentialError::UnknownGroup(group.to_string()))?;
        credentials.gid = found.gid.as_raw();
    }

    tracing::trace!(uid = credentials.uid, gid = credentials.gid, "resolved credentials");
    Ok(Some(credentials))
}

#[cfg(not(unix))]
/// Credential switching is unavailable: a configured user is ignored with a
/// warning and the command runs as the daemon's own user.
pub fn resolve(
    user: Option<&str>,
    group: Option<&str>,
) -> Result<Option<Credentials>, CredentialError> {
    if let Some(user) = user.filter(|u| !u.is_empty()) {
        tracing::warn!(
            user,
            ?group,
            "switching credentials is not supported on this platform, running as current user"
        );
    }
    Ok(None)
}
