use crate::error::CmdError;
use crate::protocol::mysql::constants::SCRAMBLE_SIZE;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha1::Digest;

pub mod authenticator;

/// Generate a random string user ASCII but avoid separator character.
/// https://github.com/mysql/mysql-server/blob/8.0/mysys/crypt_genhash_impl.cc#L427
#[inline]
pub fn gen_user_salt() -> [u8; SCRAMBLE_SIZE] {
    let mut salt: [u8; SCRAMBLE_SIZE] = [0; SCRAMBLE_SIZE];
    let mut r = StdRng::from_entropy();
    for salt_item in salt.iter_mut() {
        let salt_rand = r.gen_range(0..127) as u8;
        *salt_item = salt_rand;
        if *salt_item == b'\0' || *salt_item == b'$' {
            *salt_item += 1;
        }
    }
    salt
}

pub fn sha1_1(bytes: impl AsRef<[u8]>) -> [u8; 20] {
    sha1::Sha1::digest(bytes).into()
}

pub fn sha1_2(bytes1: impl AsRef<[u8]>, bytes2: impl AsRef<[u8]>) -> [u8; 20] {
    let mut hasher = sha1::Sha1::new();
    hasher.update(bytes1.as_ref());
    hasher.update(bytes2.as_ref());
    hasher.finalize().into()
}

pub fn xor<T, U>(mut left: T, right: U) -> T
where
    T: AsMut<[u8]>,
    U: AsRef<[u8]>,
{
    left.as_mut()
        .iter_mut()
        .zip(right.as_ref().iter())
        .for_each(|(l, r)| *l ^= r);
    left
}

/// The `mysql_native_password` token a client sends for `password`:
/// `SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))`.
pub fn native_password_token(password: &[u8], scramble: &[u8]) -> [u8; 20] {
    let stage1 = sha1_1(password);
    let stage2 = sha1_1(stage1);
    xor(stage1, sha1_2(scramble, stage2))
}

/// Checks the client's credentials during the connection phase.
///
/// `scramble` is the 20 byte challenge sent in the initial handshake (and repeated in
/// an auth switch), `auth_response` the client's `mysql_native_password` answer to it.
/// A failure is sent to the client as an ERR packet and closes the connection.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        user: &str,
        scramble: &[u8; SCRAMBLE_SIZE],
        auth_response: &[u8],
    ) -> Result<(), CmdError>;
}
