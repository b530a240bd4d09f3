use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = table_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }

    /// Whether `raw` carries this type's prefix.
    fn has_prefix(raw: &str) -> bool {
        raw.strip_prefix(Self::PREFIX)
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    /// One accepted client WebSocket.
    pub const CONNECTION: &str = "conn";
    /// One fan-out pass of the broadcast hub (used to correlate log lines).
    pub const BROADCAST: &str = "bc";
}
