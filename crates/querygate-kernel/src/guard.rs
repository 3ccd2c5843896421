/// Shared-secret admission. Holds nothing but the configured secret, so it can
/// be shared across request tasks without locking.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    secret: Option<String>,
    allow_unconfigured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDenied;

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Could not validate credentials")
    }
}

impl std::error::Error for AccessDenied {}

impl AccessPolicy {
    pub fn new(secret: Option<String>, allow_unconfigured: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            allow_unconfigured,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn admit(&self, presented: Option<&str>) -> Result<(), AccessDenied> {
        match (&self.secret, presented) {
            (None, _) if self.allow_unconfigured => Ok(()),
            (Some(secret), Some(p)) if constant_time_eq(secret.as_bytes(), p.as_bytes()) => {
                Ok(())
            }
            _ => Err(AccessDenied),
        }
    }
}

// Length leaks; contents don't.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_allow_admits_anything() {
        let policy = AccessPolicy::new(None, true);
        for presented in [None, Some(""), Some("whatever")] {
            assert_eq!(policy.admit(presented), Ok(()));
        }
    }

    #[test]
    fn unconfigured_deny_rejects_everything() {
        let policy = AccessPolicy::new(None, false);
        assert_eq!(policy.admit(None), Err(AccessDenied));
        assert_eq!(policy.admit(Some("x")), Err(AccessDenied));
    }

    #[test]
    fn empty_secret_counts_as_unconfigured() {
        let policy = AccessPolicy::new(Some(String::new()), true);
        assert!(!policy.is_configured());
        assert_eq!(policy.admit(None), Ok(()));
    }

    #[test]
    fn configured_secret_admits_only_exact_match() {
        let policy = AccessPolicy::new(Some("s3cret".to_string()), true);
        assert_eq!(policy.admit(Some("s3cret")), Ok(()));
        for presented in [None, Some(""), Some("s3cre"), Some("s3cret "), Some("S3CRET")] {
            assert_eq!(policy.admit(presented), Err(AccessDenied));
        }
    }

    #[test]
    fn secret_with_surrounding_spaces_needs_the_exact_bytes() {
        let policy = AccessPolicy::new(Some(" k3y ".to_string()), true);
        assert_eq!(policy.admit(Some(" k3y ")), Ok(()));
        assert_eq!(policy.admit(Some("k3y")), Err(AccessDenied));
    }

    #[test]
    fn denial_message_carries_no_detail() {
        assert_eq!(AccessDenied.to_string(), "Could not validate credentials");
    }
}
