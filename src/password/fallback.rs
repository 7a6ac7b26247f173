//! Migration-friendly authentication.
//!
//! A client does not know which version its password was registered with. It
//! starts at the current version and walks down to 0, moving on only when the
//! server answers [`Error::VersionMismatch`].

use super::{CURRENT_PASSWORD_VERSION, DerivedCredentials, PasswordService, VersionedPassword};
use crate::Error;
use tracing::{debug, warn};

/// Result of a successful [`PasswordService::change_password`].
pub struct PasswordChange<T> {
    /// Whatever the server returned for the accepted attempt.
    pub response: T,
    /// Credentials of the old password at the version the server accepted.
    pub previous: DerivedCredentials,
    /// Credentials of the new password at [`CURRENT_PASSWORD_VERSION`].
    pub current: DerivedCredentials,
}

impl PasswordService {
    /// Authenticates with the newest version the server accepts.
    ///
    /// `attempt` submits one derived code and is called at most
    /// `CURRENT_PASSWORD_VERSION + 1` times. Any error other than
    /// [`Error::VersionMismatch`] ends the search immediately.
    pub fn authenticate_with_fallback<T>(
        &self,
        username: &str,
        password: &str,
        mut attempt: impl FnMut(&VersionedPassword) -> Result<T, Error>,
    ) -> Result<(T, DerivedCredentials), Error> {
        self.descend(username, password, |credentials| {
            attempt(credentials.password())
        })
    }

    /// Replaces the password, proving knowledge of the old one.
    ///
    /// The old password is tried from the current version downwards exactly
    /// like [`authenticate_with_fallback`](Self::authenticate_with_fallback);
    /// the new one is always derived at the current version.
    pub fn change_password<T>(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
        mut attempt: impl FnMut(&VersionedPassword, &VersionedPassword) -> Result<T, Error>,
    ) -> Result<PasswordChange<T>, Error> {
        let current = self.derive(username, new_password, CURRENT_PASSWORD_VERSION)?;
        let (response, previous) = self.descend(username, old_password, |credentials| {
            attempt(credentials.password(), current.password())
        })?;

        Ok(PasswordChange {
            response,
            previous,
            current,
        })
    }

    fn descend<T>(
        &self,
        username: &str,
        password: &str,
        mut attempt: impl FnMut(&DerivedCredentials) -> Result<T, Error>,
    ) -> Result<(T, DerivedCredentials), Error> {
        for version in (0..=CURRENT_PASSWORD_VERSION).rev() {
            let credentials = self.derive(username, password, version)?;
            match attempt(&credentials) {
                Ok(response) => {
                    if version < CURRENT_PASSWORD_VERSION {
                        debug!(version, "accepted a legacy password version");
                    }
                    return Ok((response, credentials));
                }
                Err(Error::VersionMismatch) => {
                    debug!(version, "password version rejected, falling back");
                }
                Err(err) => return Err(err),
            }
        }

        warn!("every password version was rejected");
        Err(Error::VersionMismatch)
    }
}
