use std::fmt;

const REDACTED: &str = "****";

/// Holds a credential (API keys, server keys) so that it can be passed around in configuration structs without ending
/// up in logs. Both `Debug` and `Display` print a placeholder; the value is only reachable through [`Secret::reveal`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// True if no credential was configured.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

#[cfg(test)]
mod test {
    use super::Secret;

    #[test]
    fn secrets_are_not_printed() {
        let s = Secret::new("SB-Mid-server-abc".to_string());
        assert_eq!(format!("{s} {s:?}"), "**** Secret(****)");
        assert_eq!(s.reveal(), "SB-Mid-server-abc");
        assert!(!s.is_empty());
        assert!(Secret::<String>::default().is_empty());
    }
}
