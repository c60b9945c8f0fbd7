//! Administrative calls
//!
//! A small HTTP surface under `/adm/api/v1/`, authorized with the caster's
//! admin credential:
//!
//! ```text
//! GET  livesources     mountpoints and their counters
//! GET  sourcetables    sourcetable records
//! POST drop            disconnect the source of `mountpoint`
//! ```
//!
//! Parameters come from the query string or the body, url-encoded
//! (`mountpoint=RTCM3`) or JSON (`{"mountpoint": "RTCM3"}`). Replacing the
//! mountpoint definitions stays with the embedding application through
//! [`CasterServer::reload_auth`](super::CasterServer::reload_auth).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::AuthRegistry;
use crate::protocol::{AdminMethod, AdminRequest, Status};
use crate::registry::MountpointTable;
use crate::stats::MountStats;

/// A resolved administrative call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    LiveSources,
    Sourcetables,
    Drop { mount: String },
}

#[derive(Debug, Default, Deserialize)]
struct DropParams {
    mountpoint: Option<String>,
}

/// One `livesources` record
#[derive(Debug, Serialize)]
struct LiveSource<'a> {
    mountpoint: &'a str,
    live: bool,
    source_session: Option<u64>,
    subscribers: usize,
    bytes_in: u64,
    chunks_in: u64,
    bitrate: u64,
    sources_served: u64,
    idle_secs: Option<u64>,
    age_secs: u64,
}

impl<'a> From<&'a MountStats> for LiveSource<'a> {
    fn from(stats: &'a MountStats) -> Self {
        Self {
            mountpoint: &stats.name,
            live: stats.is_live(),
            source_session: stats.producer_session,
            subscribers: stats.subscriber_count,
            bytes_in: stats.bytes_in,
            chunks_in: stats.chunks_in,
            bitrate: stats.bitrate(),
            sources_served: stats.sources_served,
            idle_secs: stats.idle_for.map(|d| d.as_secs()),
            age_secs: stats.age.as_secs(),
        }
    }
}

impl AdminCommand {
    /// Resolve a call and its parameters
    ///
    /// Unknown calls (or a known call with the wrong method) are
    /// [`Status::NotFound`]; missing or unreadable parameters are
    /// [`Status::BadRequest`].
    pub fn parse(req: &AdminRequest, body: &[u8]) -> Result<Self, Status> {
        match (req.method, req.call.trim_end_matches('/')) {
            (AdminMethod::Get, "livesources") => Ok(AdminCommand::LiveSources),
            (AdminMethod::Get, "sourcetables") => Ok(AdminCommand::Sourcetables),
            (AdminMethod::Post, "drop") => {
                let mount = drop_target(req.query.as_deref(), body)?;
                Ok(AdminCommand::Drop { mount })
            }
            _ => Err(Status::NotFound),
        }
    }

    /// Run the call; returns the JSON reply body
    pub async fn execute(&self, auth: &AuthRegistry, mounts: &MountpointTable) -> String {
        match self {
            AdminCommand::LiveSources => {
                let stats = mounts.snapshot().await;
                let sources: Vec<LiveSource<'_>> = stats.iter().map(LiveSource::from).collect();
                json!(sources).to_string()
            }
            AdminCommand::Sourcetables => json!(auth.sourcetable_entries()).to_string(),
            AdminCommand::Drop { mount } => {
                let dropped = match mounts.lookup(mount).await {
                    Some(state) => state.drop_producer(),
                    None => false,
                };
                tracing::info!(mount = %mount, dropped = dropped, "Admin drop");
                json!({ "mountpoint": mount, "dropped": dropped }).to_string()
            }
        }
    }
}

fn drop_target(query: Option<&str>, body: &[u8]) -> Result<String, Status> {
    let body = std::str::from_utf8(body).map_err(|_| Status::BadRequest)?.trim();

    let mount = if body.starts_with('{') {
        serde_json::from_str::<DropParams>(body)
            .map_err(|_| Status::BadRequest)?
            .mountpoint
    } else {
        form_value(body, "mountpoint").or_else(|| query.and_then(|q| form_value(q, "mountpoint")))
    };

    mount
        .map(|m| m.trim_start_matches('/').to_owned())
        .filter(|m| !m.is_empty())
        .ok_or(Status::BadRequest)
}

/// Value of `key` in `a=1&b=2`; mountpoint names never need escaping
fn form_value(form: &str, key: &str) -> Option<String> {
    form.split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MountpointDefinition;

    fn request(method: AdminMethod, call: &str, query: Option<&str>) -> AdminRequest {
        AdminRequest {
            method,
            call: call.into(),
            query: query.map(str::to_owned),
            credential: None,
            content_length: 0,
        }
    }

    #[test]
    fn test_parse_calls() {
        let get = |call: &str| AdminCommand::parse(&request(AdminMethod::Get, call, None), b"");

        assert_eq!(get("livesources"), Ok(AdminCommand::LiveSources));
        assert_eq!(get("sourcetables/"), Ok(AdminCommand::Sourcetables));
        assert_eq!(get("mem"), Err(Status::NotFound));
        assert_eq!(get("drop"), Err(Status::NotFound));
    }

    #[test]
    fn test_drop_parameters() {
        let post = |query: Option<&str>, body: &str| {
            AdminCommand::parse(&request(AdminMethod::Post, "drop", query), body.as_bytes())
        };
        let expected = Ok(AdminCommand::Drop {
            mount: "RTCM3".into(),
        });

        assert_eq!(post(Some("mountpoint=RTCM3"), ""), expected);
        assert_eq!(post(None, "user=x&mountpoint=/RTCM3"), expected);
        assert_eq!(post(None, r#"{"mountpoint": "RTCM3"}"#), expected);

        assert_eq!(post(None, ""), Err(Status::BadRequest));
        assert_eq!(post(Some("mountpoint="), ""), Err(Status::BadRequest));
        assert_eq!(post(None, "{not json"), Err(Status::BadRequest));
    }

    #[tokio::test]
    async fn test_execute() {
        let auth = AuthRegistry::new(vec![MountpointDefinition::new("RTCM3", "pw")]);
        let mounts = MountpointTable::new();
        let mount = mounts.get_or_create("RTCM3").await;
        let guard = mount.attach_producer(7).unwrap();
        guard.publish(bytes::Bytes::from_static(b"abc")).unwrap();

        let listing: serde_json::Value =
            serde_json::from_str(&AdminCommand::LiveSources.execute(&auth, &mounts).await).unwrap();
        assert_eq!(listing[0]["mountpoint"], "RTCM3");
        assert_eq!(listing[0]["live"], true);
        assert_eq!(listing[0]["source_session"], 7);
        assert_eq!(listing[0]["bytes_in"], 3);

        let entries: Vec<String> =
            serde_json::from_str(&AdminCommand::Sourcetables.execute(&auth, &mounts).await).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("STR;RTCM3;"));

        let command = AdminCommand::Drop {
            mount: "RTCM3".into(),
        };
        let reply: serde_json::Value =
            serde_json::from_str(&command.execute(&auth, &mounts).await).unwrap();
        assert_eq!(reply["dropped"], true);
        assert!(guard.is_cancelled());

        let missing = AdminCommand::Drop {
            mount: "NOPE".into(),
        };
        let reply: serde_json::Value =
            serde_json::from_str(&missing.execute(&auth, &mounts).await).unwrap();
        assert_eq!(reply["dropped"], false);
    }
}
