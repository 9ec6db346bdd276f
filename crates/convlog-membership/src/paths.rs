//! Well-known paths of a conversation tree.

pub const ADMINS: &str = "admins";
pub const MEMBERS: &str = "members";
pub const INVITED: &str = "invited";
pub const BANNED: &str = "banned";
pub const DEVICES: &str = "devices";
pub const VOTES: &str = "votes";
pub const CRLS: &str = "CRLs";
pub const PROFILE: &str = "profile.vcf";

pub const CERT_EXT: &str = ".crt";

pub fn admin_cert(uri: &str) -> String {
    format!("{ADMINS}/{uri}{CERT_EXT}")
}

pub fn member_cert(uri: &str) -> String {
    format!("{MEMBERS}/{uri}{CERT_EXT}")
}

pub fn invited(uri: &str) -> String {
    format!("{INVITED}/{uri}")
}

pub fn device_cert(device: &str) -> String {
    format!("{DEVICES}/{device}{CERT_EXT}")
}

pub fn crl(uri: &str) -> String {
    format!("{CRLS}/{uri}")
}

/// Strip the certificate extension from a directory entry, if present.
pub fn uri_from_file(name: &str) -> &str {
    match name.find(CERT_EXT) {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Device id from a `devices/<id>.crt` path.
pub fn device_from_path(path: &str) -> Option<&str> {
    path.strip_prefix("devices/")?
        .strip_suffix(CERT_EXT)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}
