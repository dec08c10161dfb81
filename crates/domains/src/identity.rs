//! Canonical identity used to bucket per-author rate-limit history.

use std::fmt;

/// Case-insensitive (name, contact) pair.
///
/// Both parts are lower-cased on construction, so `("Alice", "A@X.COM")` and
/// `("alice", "a@x.com")` compare and hash equal. The parts are kept separate
/// rather than joined, so a `:` inside a name cannot collide with another identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    name: String,
    contact: String,
}

impl IdentityKey {
    pub fn new(name: &str, contact: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            contact: contact.to_lowercase(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.contact)
    }
}
