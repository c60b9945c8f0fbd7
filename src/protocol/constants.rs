//! NTRIP protocol constants

/// IANA-registered NTRIP port
pub const DEFAULT_PORT: u16 = 2101;

/// Largest request header accepted before the connection is dropped
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Longest mountpoint name accepted
pub const MAX_MOUNT_LEN: usize = 100;

/// `Server:` header and sourcetable generator value
pub const SERVER_NAME: &str = concat!("NTRIP ntrip-caster/", env!("CARGO_PKG_VERSION"));

/// Value of the `Ntrip-Version` header for NTRIP 2.0
pub const NTRIP_V2: &str = "Ntrip/2.0";

/// Content type of relayed correction data
pub const GNSS_DATA: &str = "gnss/data";

/// Content type of an NTRIP 2.0 sourcetable
pub const GNSS_SOURCETABLE: &str = "gnss/sourcetable";

/// Path prefix of the administrative HTTP calls
pub const ADMIN_PREFIX: &str = "/adm/api/v1/";

/// Content type of administrative replies
pub const APPLICATION_JSON: &str = "application/json";

/// Sourcetable terminator line
pub const END_SOURCETABLE: &str = "ENDSOURCETABLE";
