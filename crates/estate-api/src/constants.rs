/// Prefix shared by every versioned route.
pub const API_PREFIX: &str = "/api/v0";
