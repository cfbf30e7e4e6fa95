//! `Lyrebird` Constants
//!
//! This module contains all the constants used throughout the `Lyrebird` library.
//! These constants define capacity limits, invalid-handle sentinels and
//! BAP-specific boundary values used in the implementation.

/// Maximum number of simultaneous connections tracked by the registry
pub const MAX_CONNECTIONS: usize = 4;

/// Maximum number of stream groups (at most one per connection)
pub const MAX_STREAM_GROUPS: usize = 4;

/// Maximum number of ASEs per connection
pub const MAX_ASES: usize = 6;

/// Maximum number of CISes per CIG
pub const MAX_CIS: usize = 8;

/// Maximum number of subgroups in a broadcast source
pub const MAX_SUBGROUPS: usize = 4;

/// Maximum length of subgroup metadata in bytes (LTV formatted)
pub const MAX_METADATA: usize = 64;

/// Maximum length of a vendor codec configuration payload in bytes
pub const MAX_VENDOR_DATA: usize = 32;

/// Maximum length of a built ISO data-path codec configuration in bytes
pub const MAX_CODEC_CONFIG: usize = 48;

/// Maximum number of locally registered PAC records
pub const MAX_PAC_RECORDS: usize = 8;

/// Maximum length of a remote PAC record payload carried in events
pub const MAX_PAC_RECORD_DATA: usize = 64;

/// Depth of the request/confirm/command/event channels
pub const MAX_CHANNELS: usize = 8;

/// Maximum number of commands a single request or event may emit
pub const MAX_OUTBOX: usize = 8;

/// Maximum number of confirmations a single event may produce
pub const MAX_CONFIRMS: usize = 4;

/// CIS handle value meaning "not connected at the link layer"
pub const INVALID_CIS_HANDLE: u16 = 0xFFFF;

/// Largest valid ISO (CIS or BIS) handle for data-path operations
pub const MAX_ISO_HANDLE: u16 = 0x0EFF;

/// Largest valid CIG identifier for CIG removal
pub const MAX_CIG_ID: u8 = 0xEF;

/// Audio channel allocation value for mono; the allocation LTV entry is
/// omitted from codec configurations carrying this value
pub const AUDIO_LOCATION_MONO: u32 = 0x0000_0000;

/// Subgroup BIS synchronization value meaning "no preference"
pub const BIS_SYNC_NO_PREFERENCE: u32 = 0xFFFF_FFFF;
