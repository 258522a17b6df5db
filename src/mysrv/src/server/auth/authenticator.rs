use crate::error::CmdError;
use crate::protocol::mysql::constants::SCRAMBLE_SIZE;
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::server::auth::{sha1_1, sha1_2, xor, Authenticator};

use async_trait::async_trait;
use tracing::debug;

fn access_denied(user: &str) -> CmdError {
    CmdError::server(
        ErrorKind::ER_ACCESS_DENIED_ERROR,
        format!("Access denied for user '{user}'"),
    )
}

/// Accepts every user with any password.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAnyUser;

#[async_trait]
impl Authenticator for AllowAnyUser {
    async fn authenticate(
        &self,
        user: &str,
        _scramble: &[u8; SCRAMBLE_SIZE],
        _auth_response: &[u8],
    ) -> Result<(), CmdError> {
        debug!("MySrv auth accept user={user}");
        Ok(())
    }
}

/// A single account checked with `mysql_native_password`.
///
/// Only the double SHA1 of the password is kept, the same value MySQL stores in
/// `mysql.user.authentication_string`. `None` means the account has no password.
#[derive(Debug, Clone)]
pub struct NativePassword {
    user: String,
    stage2: Option<[u8; 20]>,
}

impl NativePassword {
    pub fn new(user: impl Into<String>, password: impl AsRef<[u8]>) -> Self {
        let password = password.as_ref();
        let stage2 = if password.is_empty() {
            None
        } else {
            Some(sha1_1(sha1_1(password)))
        };
        Self {
            user: user.into(),
            stage2,
        }
    }

    /// Builds the account from a stored hash such as
    /// `*2470C0C06DEE42FD1618BB99005ADCA2EC9D1E19`. The leading `*` is optional.
    pub fn with_hash(user: impl Into<String>, hash: &str) -> Result<Self, hex::FromHexError> {
        let mut stage2 = [0u8; 20];
        hex::decode_to_slice(hash.trim_start_matches('*'), &mut stage2)?;
        Ok(Self {
            user: user.into(),
            stage2: Some(stage2),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn check(&self, scramble: &[u8], auth_response: &[u8]) -> bool {
        match &self.stage2 {
            None => auth_response.is_empty(),
            Some(stage2) => {
                if auth_response.len() != 20 {
                    return false;
                }
                let stage1 = xor(sha1_2(scramble, stage2), auth_response);
                sha1_1(stage1) == *stage2
            }
        }
    }
}

#[async_trait]
impl Authenticator for NativePassword {
    async fn authenticate(
        &self,
        user: &str,
        scramble: &[u8; SCRAMBLE_SIZE],
        auth_response: &[u8],
    ) -> Result<(), CmdError> {
        if user != self.user || !self.check(scramble, auth_response) {
            debug!("MySrv auth reject user={user}");
            return Err(access_denied(user));
        }
        Ok(())
    }
}
