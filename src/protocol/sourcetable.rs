//! NTRIP sourcetable rendering
//!
//! The sourcetable lists the caster's mountpoints as `STR;` records, one per
//! line, terminated by `ENDSOURCETABLE`. Configured records are used verbatim;
//! mountpoints without one get a minimal generated record.

use bytes::Bytes;

use crate::auth::MountpointDefinition;

use super::constants::{END_SOURCETABLE, GNSS_SOURCETABLE, NTRIP_V2};
use super::request::NtripVersion;

/// `STR;` record for a mountpoint
pub fn entry_for(def: &MountpointDefinition) -> String {
    if let Some(entry) = &def.sourcetable_entry {
        return entry.trim_end().to_owned();
    }

    let authentication = if def.is_public() { "N" } else { "B" };
    format!(
        "STR;{name};{name};RTCM 3;;2;GPS;;;0.00;0.00;0;0;ntrip-caster;none;{authentication};N;0;",
        name = def.name
    )
}

/// Sourcetable body, including the terminator line
pub fn render_body<I>(entries: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut body = String::new();
    for entry in entries {
        body.push_str(entry.as_ref());
        body.push_str("\r\n");
    }
    body.push_str(END_SOURCETABLE);
    body.push_str("\r\n");
    body
}

/// Complete sourcetable response
pub fn render<I>(version: NtripVersion, server: &str, entries: I) -> Bytes
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let body = render_body(entries);

    let head = match version {
        NtripVersion::V1 => format!(
            "SOURCETABLE 200 OK\r\nServer: {server}\r\nContent-Type: text/plain\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        ),
        NtripVersion::V2 => format!(
            "HTTP/1.1 200 OK\r\nNtrip-Version: {NTRIP_V2}\r\nServer: {server}\r\n\
             Content-Type: {GNSS_SOURCETABLE}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        ),
    };

    Bytes::from(head + &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Vec<MountpointDefinition> {
        vec![
            MountpointDefinition::new("OPEN", "pw"),
            MountpointDefinition::new("PRIVATE", "pw").subscriber("rover", "pw"),
            MountpointDefinition::new("CUSTOM", "pw")
                .sourcetable_entry("STR;CUSTOM;Berlin;RTCM 3.2;1005(10);2;GPS+GLO;EUREF;DEU;52.52;13.40;1;0;sNTRIP;none;N;N;2400;\r\n"),
        ]
    }

    #[test]
    fn test_generated_entries() {
        let defs = definitions();
        assert!(entry_for(&defs[0]).starts_with("STR;OPEN;OPEN;RTCM 3;"));
        assert!(entry_for(&defs[0]).contains(";N;N;0;"));
        assert!(entry_for(&defs[1]).contains(";B;N;0;"));
    }

    #[test]
    fn test_configured_entry_verbatim() {
        let defs = definitions();
        assert_eq!(
            entry_for(&defs[2]),
            "STR;CUSTOM;Berlin;RTCM 3.2;1005(10);2;GPS+GLO;EUREF;DEU;52.52;13.40;1;0;sNTRIP;none;N;N;2400;"
        );
    }

    #[test]
    fn test_v1_response() {
        let entries: Vec<String> = definitions().iter().map(entry_for).collect();
        let resp = render(NtripVersion::V1, "caster", &entries);
        let text = std::str::from_utf8(&resp).unwrap();

        assert!(text.starts_with("SOURCETABLE 200 OK\r\n"));
        assert!(text.ends_with("ENDSOURCETABLE\r\n"));
        assert_eq!(text.matches("STR;").count(), 3);

        let (_, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
    }

    #[test]
    fn test_v2_response() {
        let resp = render(NtripVersion::V2, "caster", Vec::<String>::new());
        let text = std::str::from_utf8(&resp).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: gnss/sourcetable\r\n"));
        assert!(text.ends_with("\r\n\r\nENDSOURCETABLE\r\n"));
    }
}
