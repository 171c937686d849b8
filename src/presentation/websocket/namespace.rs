//! Identity Namespaces
//!
//! The gateway serves two parallel instantiations of the same registry
//! design, one per kind of principal. A `Namespace` bundles the names that
//! differ between them: the shared registry hash, the handshake field the
//! client must supply, and the logical group prefix.

/// A namespace of logical identities served by one connection registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace {
    label: &'static str,
    registry_key: &'static str,
    handshake_field: &'static str,
}

/// User namespace: identities are user ids.
pub const USERS: Namespace = Namespace {
    label: "user",
    registry_key: "socket:users",
    handshake_field: "userId",
};

/// Device namespace: identities are device keys.
pub const DEVICES: Namespace = Namespace {
    label: "device",
    registry_key: "socket:devices",
    handshake_field: "deviceKey",
};

impl Namespace {
    /// Short name used in group names and log lines.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Name of the shared registry hash. External consumers interoperate
    /// through exactly this key.
    pub fn registry_key(&self) -> &'static str {
        self.registry_key
    }

    /// Handshake field carrying the identity; its absence is a hard
    /// rejection.
    pub fn handshake_field(&self) -> &'static str {
        self.handshake_field
    }

    /// Logical group name for an identity, e.g. `user:<id>`.
    pub fn group(&self, identity: &str) -> String {
        format!("{}:{}", self.label, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn user_namespace_names() {
        assert_eq!(USERS.registry_key(), "socket:users");
        assert_eq!(USERS.handshake_field(), "userId");
        assert_eq!(USERS.group("u1"), "user:u1");
    }

    #[test]
    fn device_namespace_names() {
        assert_eq!(DEVICES.registry_key(), "socket:devices");
        assert_eq!(DEVICES.handshake_field(), "deviceKey");
        assert_eq!(DEVICES.group("d-abc"), "device:d-abc");
    }
}
