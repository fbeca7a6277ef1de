/// Application name
pub const APP_NAME: &str = "roomchat";

/// Service type every node advertises and browses under.
/// Nodes with a different service type never see each other.
pub const SERVICE_TYPE: &str = "local-chat";

/// Discovery metadata key carrying the advertised room token
pub const DISCOVERY_ROOM_KEY: &str = "room";

/// Current wire payload version
pub const PROTOCOL_VERSION: u16 = 1;

/// Maximum encoded payload size in bytes (8 MiB, drawings included)
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

/// How long an outgoing invitation stays valid, in seconds
pub const DEFAULT_INVITE_TIMEOUT_SECS: u64 = 30;

/// Capacity of the command and notification channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Display name used when nothing better is known
pub const DEFAULT_DISPLAY_NAME: &str = "User";
