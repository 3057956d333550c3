use super::RegistryError;
use std::borrow::Cow;
use std::fmt;

/// Origin tag of a group of handlers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    key: Cow<'static, str>,
    /// Reusable across stories, as opposed to story-specific
    shared: bool,
}

impl Namespace {
    /// Sentinel for handlers whose origin is not a known provider
    pub const UNKNOWN: Namespace = Namespace {
        key: Cow::Borrowed("unknown"),
        shared: false,
    };

    pub const DEV_TOOLS: Namespace = Namespace {
        key: Cow::Borrowed("dev-tools"),
        shared: true,
    };

    const KNOWN: [Namespace; 1] = [Self::DEV_TOOLS];

    pub fn new(key: impl Into<String>, shared: bool) -> Result<Self, RegistryError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(RegistryError::BlankNamespace);
        }
        Ok(Self {
            key: Cow::Owned(key),
            shared,
        })
    }

    /// Look up a built-in namespace, never failing
    pub fn resolve(key: &str) -> Namespace {
        Self::KNOWN
            .into_iter()
            .find(|ns| ns.key == key)
            .unwrap_or(Self::UNKNOWN)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Prefix a handler id with this namespace, e.g. `dev-tools:set_context_1`
    pub fn qualify(&self, id: &str) -> String {
        format!("{}:{id}", self.key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_rejected() {
        assert_eq!(Namespace::new("  ", true), Err(RegistryError::BlankNamespace));
        assert_eq!(Namespace::new("", false), Err(RegistryError::BlankNamespace));
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        assert_eq!(Namespace::resolve("dev-tools"), Namespace::DEV_TOOLS);
        assert!(Namespace::resolve("dev-tools").is_shared());
        assert_eq!(Namespace::resolve("insurance"), Namespace::UNKNOWN);
        assert_eq!(Namespace::resolve("").key(), "unknown");
    }

    #[test]
    fn test_qualify() {
        let ns = Namespace::new("banking", false).unwrap();
        assert_eq!(ns.qualify("check_transfer"), "banking:check_transfer");
        assert!(!ns.is_shared());
    }
}
