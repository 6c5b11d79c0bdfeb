use anyhow::{bail, Error};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A `Vec` that always holds at least one element.
///
/// Input descriptors require at least one claim path, so the guarantee
/// lives in the type instead of in scattered length checks.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
pub struct NonEmptyVec<T: Clone>(Vec<T>);

impl<T: Clone> NonEmptyVec<T> {
    pub fn new(first: T) -> Self {
        Self(vec![first])
    }

    /// The leading element, which is guaranteed to exist.
    pub fn first(&self) -> &T {
        &self.0[0]
    }

    pub fn push(&mut self, t: T) {
        self.0.push(t)
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T: Clone> TryFrom<Vec<T>> for NonEmptyVec<T> {
    type Error = Error;

    fn try_from(v: Vec<T>) -> Result<NonEmptyVec<T>, Error> {
        if v.is_empty() {
            bail!("at least one element is required")
        }
        Ok(NonEmptyVec(v))
    }
}

impl<T: Clone> From<NonEmptyVec<T>> for Vec<T> {
    fn from(NonEmptyVec(v): NonEmptyVec<T>) -> Vec<T> {
        v
    }
}

impl<T: Clone> Deref for NonEmptyVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

/// An opaque token from 32 bytes of CSPRNG output, base64url without padding.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64url_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(s)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_empty_vec_rejects_empty() {
        assert!(NonEmptyVec::<u8>::try_from(vec![]).is_err());
        let mut v = NonEmptyVec::new(1);
        v.push(2);
        assert_eq!(v.first(), &1);
        assert_eq!(v.into_inner(), vec![1, 2]);
    }

    #[test]
    fn random_tokens_are_distinct() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        assert_eq!(base64url_decode(&a).unwrap().len(), 32);
    }
}
