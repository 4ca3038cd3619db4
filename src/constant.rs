//! This module contains constants that are needed throughout the codebase.

/// The number of low bits of a protobuf tag that encode the wire type.
///
/// The field number of a tag is obtained by shifting the tag right by this
/// amount.
pub const WIRE_TYPE_BITS: u32 = 3;

/// The mask that selects the wire type out of a raw protobuf tag.
pub const WIRE_TYPE_MASK: u64 = 0b111;

/// The number of payload bits carried by each byte of a base-128 varint.
pub const VARINT_PAYLOAD_BITS: u32 = 7;

/// The bit that marks a varint byte as being followed by another byte.
pub const VARINT_CONTINUATION_BIT: u8 = 0x80;

/// The maximum number of bytes that a varint encoding a 64-bit value can span.
pub const VARINT_MAX_BYTES: usize = 10;

/// The smallest tag number that is treated as belonging to an extension range.
///
/// Non-required fields at or above this tag are moved out of their declaring
/// message and attached as `extend` blocks to the message they reference.
pub const DEFAULT_EXTENSION_TAG_THRESHOLD: u32 = 100;

/// The messages that may never be the target of a recovered extension.
pub const DEFAULT_EXTENSION_DENY_LIST: &[&str] = &[".PegasusShared.ScenarioDbRecord"];

/// Whether the extractor returns a schema even when some types failed to
/// decompile.
pub const DEFAULT_PERMISSIVE_ERRORS_ENABLED: bool = false;

/// The name of the field that the runtime uses to hold the storage of an enum.
pub const ENUM_STORAGE_FIELD: &str = "value__";

/// The name of the container type that nested message types get placed into by
/// some generators.
pub const NESTED_TYPES_CONTAINER: &str = "Types";

/// The package given to types that the reader could not place.
pub const UNKNOWN_PACKAGE: &str = "unknown";

/// The name used for request types of RPCs whose input could not be
/// recovered.
pub const UNKNOWN_RPC_INPUT: &str = "Unknown";
