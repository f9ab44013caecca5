//! Sender and recipient addresses.

/// A sender or recipient address, as decoded from a message header.
///
/// `"Juan García <juan@ejemplo.com>"` has `display_name = "Juan García"` and
/// `address = "juan@ejemplo.com"`; a bare `user@example.com` has an empty
/// display name.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq, Default)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`, may be empty).
    pub address: String,
}

impl EmailAddress {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
        }
    }

    /// The display name, or the bare address when there is no name.
    pub fn name_or_address(&self) -> &str {
        if self.display_name.is_empty() {
            &self.address
        } else {
            &self.display_name
        }
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
