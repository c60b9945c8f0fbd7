//! Credentials as presented by NTRIP clients

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Credential presented by a connecting client
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// NTRIP 1.0 `SOURCE <password> <mount>`: password only
    Password(String),
    /// HTTP Basic authorization
    Basic {
        /// User name
        user: String,
        /// Password
        password: String,
    },
}

impl Credential {
    /// Build a Basic credential
    pub fn basic(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Basic {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Parse the value of an `Authorization` header
    ///
    /// Only the Basic scheme is understood; returns `None` for anything else
    /// or for undecodable input.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some(Credential::basic(user, password))
    }

    /// Render as an `Authorization` header value
    pub fn to_authorization(&self) -> String {
        let (user, password) = match self {
            Credential::Password(password) => ("", password.as_str()),
            Credential::Basic { user, password } => (user.as_str(), password.as_str()),
        };
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    /// User name, if the credential carries one
    pub fn user(&self) -> Option<&str> {
        match self {
            Credential::Password(_) => None,
            Credential::Basic { user, .. } => Some(user),
        }
    }

    /// Password
    pub fn password(&self) -> &str {
        match self {
            Credential::Password(password) => password,
            Credential::Basic { password, .. } => password,
        }
    }

    /// Whether `presented` carries the same user and password
    pub fn verify(&self, presented: &Credential) -> bool {
        self.user() == presented.user() && constant_time_eq(self.password(), presented.password())
    }
}

// Never print passwords into logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::Basic { user, .. } => write!(f, "Basic({user}:***)"),
        }
    }
}

/// Compare secrets without an early exit on the first differing byte
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_authorization() {
        // base64("admin:admin")
        let cred = Credential::from_authorization("Basic YWRtaW46YWRtaW4=").unwrap();
        assert_eq!(cred, Credential::basic("admin", "admin"));
        assert_eq!(cred.user(), Some("admin"));
        assert_eq!(cred.password(), "admin");
    }

    #[test]
    fn test_password_may_contain_colon() {
        let header = Credential::basic("rover", "pa:ss").to_authorization();
        let cred = Credential::from_authorization(&header).unwrap();
        assert_eq!(cred.password(), "pa:ss");
    }

    #[test]
    fn test_rejects_other_schemes_and_garbage() {
        assert!(Credential::from_authorization("Bearer abc").is_none());
        assert!(Credential::from_authorization("Basic !!!").is_none());
        // base64("nocolon")
        assert!(Credential::from_authorization("Basic bm9jb2xvbg==").is_none());
        assert!(Credential::from_authorization("").is_none());
    }

    #[test]
    fn test_scheme_case_insensitive() {
        assert!(Credential::from_authorization("basic YWRtaW46YWRtaW4=").is_some());
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Credential::basic("rover", "secret"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("rover"));
    }

    #[test]
    fn test_verify() {
        let admin = Credential::basic("admin", "secret");

        assert!(admin.verify(&Credential::basic("admin", "secret")));
        assert!(!admin.verify(&Credential::basic("admin", "nope")));
        assert!(!admin.verify(&Credential::basic("root", "secret")));
        assert!(!admin.verify(&Credential::Password("secret".into())));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("secret", "secrets"));
    }
}
