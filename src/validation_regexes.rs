// snap names: lowercase letters, digits and single dashes, never starting or ending with a dash
pub static REGEX_SNAP_NAME: &str = r"^[a-z0-9](?:-?[a-z0-9])*$";

// snap option keys, validated per dot separated segment
pub static REGEX_SNAP_OPTION_SEGMENT: &str = r"^[a-z0-9](?:-?[a-z0-9])*$";

// plug names follow the same rule as snap names
pub static REGEX_PLUG_NAME: &str = r"^[a-z0-9](?:-?[a-z0-9])*$";

// characters allowed in the unit part of a registration filename, anything else is replaced
pub static REGEX_UNIT_NAME_DISALLOWED: &str = r"[^\w-]";
