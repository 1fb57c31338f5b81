/// Identity configuration constants.
///
/// Sizes of the randomly generated secrets and the defaults of a freshly issued identity.
pub const SECRET_BYTES: usize = 32;

/// Avatar assigned to every identity until the client updates it.
pub const DEFAULT_AVATAR: &str = "default";
