//! Client configuration

use std::time::Duration;

use crate::auth::Credential;
use crate::protocol::NtripVersion;

/// Where and how to connect to a caster
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Caster address (`host:port`)
    pub addr: String,

    /// Mountpoint, without the leading `/`
    pub mount: String,

    /// Credential to present
    pub credential: Option<Credential>,

    /// Protocol generation to speak
    pub version: NtripVersion,

    /// `User-Agent` (or `Source-Agent`) value
    pub user_agent: String,

    /// Connect and response-header timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a config for `mount` on the caster at `addr`
    pub fn new(addr: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            mount: mount.into().trim_start_matches('/').to_owned(),
            credential: None,
            version: NtripVersion::V1,
            user_agent: concat!("NTRIP ntrip-caster-client/", env!("CARGO_PKG_VERSION")).to_owned(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Present a password-only credential (NTRIP 1.0 `SOURCE`)
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credential = Some(Credential::Password(password.into()));
        self
    }

    /// Present HTTP Basic credentials
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credential = Some(Credential::basic(user, password));
        self
    }

    /// Speak NTRIP 2.0
    pub fn ntrip_v2(mut self) -> Self {
        self.version = NtripVersion::V2;
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set the connect and response timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_slash() {
        let config = ClientConfig::new("127.0.0.1:2101", "/RTCM3");

        assert_eq!(config.mount, "RTCM3");
        assert_eq!(config.version, NtripVersion::V1);
        assert!(config.credential.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ClientConfig::new("caster:2101", "RTCM3")
            .basic_auth("rover", "pw")
            .ntrip_v2()
            .user_agent("rover/1.0")
            .timeout(Duration::from_secs(1));

        assert_eq!(config.credential, Some(Credential::basic("rover", "pw")));
        assert_eq!(config.version, NtripVersion::V2);
        assert_eq!(config.user_agent, "rover/1.0");
        assert_eq!(config.timeout, Duration::from_secs(1));
    }
}
