use ring::digest::{Context, SHA256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Hardware challenge-response capability (e.g. a YubiKey).
///
/// The reader treats this as opaque: the master seed goes in, some bytes
/// come out, and those bytes are mixed into the final key right between the
/// master seed and the transformed key.
pub trait ChallengeResponseKey {
    fn challenge(&self, master_seed: &[u8]) -> Result<Vec<u8>>;
}

/// Composite key protecting the password database
///
/// This key is composed of a password and/or a key file which
/// must be provided when opening a KeePass password database
/// ```
/// use kdbx3::CompositeKey;
/// let mut key = CompositeKey::new();
/// key.set_user_password("secret");
/// ```
pub struct CompositeKey {
    user_password: Option<Zeroizing<Vec<u8>>>,
    keyfile: Option<Zeroizing<Vec<u8>>>,
    challenge_response: Option<Box<dyn ChallengeResponseKey>>,
}

impl CompositeKey {
    /// Create a new composite key
    pub fn new() -> CompositeKey {
        CompositeKey {
            user_password: None,
            keyfile: None,
            challenge_response: None,
        }
    }

    /// Set the password for the composite key
    /// ```
    /// # use kdbx3::CompositeKey;
    /// # let mut key = CompositeKey::new();
    /// key.set_user_password("secret");
    /// ```
    pub fn set_user_password<T>(&mut self, user_password: T)
    where
        T: AsRef<[u8]>,
    {
        let mut context = Context::new(&SHA256);
        context.update(user_password.as_ref());
        self.user_password = Some(Zeroizing::new(context.finish().as_ref().to_owned()));
    }

    /// Load a key file for the composite key
    /// ```
    /// # use kdbx3::CompositeKey;
    /// # let mut key = CompositeKey::new();
    /// key.set_keyfile("secret");
    /// ```
    pub fn set_keyfile<T>(&mut self, keyfile: T)
    where
        T: AsRef<[u8]>,
    {
        let mut context = Context::new(&SHA256);
        context.update(keyfile.as_ref());
        self.keyfile = Some(Zeroizing::new(context.finish().as_ref().to_owned()));
    }

    /// Attach a hardware challenge-response token.
    pub fn set_challenge_response(&mut self, key: Box<dyn ChallengeResponseKey>) {
        self.challenge_response = Some(key);
    }

    /// The 32-byte digest over all key components, in fixed order. This is
    /// the input of the AES key transform.
    pub fn raw_key(&self) -> Zeroizing<Vec<u8>> {
        let mut context = Context::new(&SHA256);

        if let Some(key) = &self.user_password {
            context.update(key);
        }

        if let Some(key) = &self.keyfile {
            context.update(key);
        }

        Zeroizing::new(context.finish().as_ref().to_owned())
    }

    /// Run the challenge-response token against the master seed. Returns an
    /// empty buffer when no token is attached.
    pub(crate) fn challenge(&self, master_seed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match &self.challenge_response {
            Some(key) => key
                .challenge(master_seed)
                .map(Zeroizing::new)
                .map_err(|_| Error::ChallengeResponse),
            None => Ok(Zeroizing::new(Vec::new())),
        }
    }
}

impl Default for CompositeKey {
    fn default() -> Self {
        Self::new()
    }
}
