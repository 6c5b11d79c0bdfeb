use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::random_token;

macro_rules! opaque_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a value received at the adapter boundary.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh, unguessable value.
            pub fn random() -> Self {
                Self(random_token())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_identifier! {
    /// Identifies a presentation transaction towards the Verifier front-end.
    TransactionId
}

opaque_identifier! {
    /// Identifies a presentation transaction towards the Wallet.
    ///
    /// Travels as the `state` parameter of the Authorization Request and of
    /// the Wallet's response.
    RequestId
}

opaque_identifier! {
    /// One-shot token handed to the Verifier front-end via the Wallet
    /// redirect, exchanged exactly once for the stored wallet response.
    ResponseCode
}

opaque_identifier! {
    /// Challenge bound into the Authorization Request and echoed inside
    /// verifiable presentations (key-binding JWT `nonce`).
    Nonce
}
