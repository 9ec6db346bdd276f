//! Conversation profile stored as a vCard in `profile.vcf`.

use std::collections::BTreeMap;

pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const AVATAR: &str = "avatar";
pub const RDV_ACCOUNT: &str = "rdvAccount";
pub const RDV_DEVICE: &str = "rdvDevice";
pub const MODE: &str = "mode";

const CRLF: &str = "\r\n";

/// vCard property for each profile key, in file order.
const PROPERTIES: [(&str, &str); 5] = [
    (TITLE, "FN"),
    (DESCRIPTION, "DESCRIPTION"),
    (AVATAR, "PHOTO;ENCODING=BASE64;TYPE=PNG"),
    (RDV_ACCOUNT, "RDV_ACCOUNT"),
    (RDV_DEVICE, "RDV_DEVICE"),
];

/// `true` for keys the profile file can hold.
pub fn is_profile_key(key: &str) -> bool {
    PROPERTIES.iter().any(|(k, _)| *k == key)
}

/// Encode the known keys of `infos` as a vCard. Other keys are dropped.
pub fn to_vcard(infos: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCARD");
    out.push_str(CRLF);
    out.push_str("VERSION:2.1");
    out.push_str(CRLF);
    for (key, property) in PROPERTIES {
        if let Some(value) = infos.get(key) {
            out.push_str(property);
            out.push(':');
            out.push_str(value);
            out.push_str(CRLF);
        }
    }
    out.push_str("END:VCARD");
    out
}

/// Decode a vCard into profile keys. Unknown properties are ignored.
pub fn from_vcard(data: &str) -> BTreeMap<String, String> {
    let mut infos = BTreeMap::new();
    for line in data.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some((property, value)) = line.split_once(':') else {
            continue;
        };
        // Parameters after `;` do not change which key a property maps to.
        let name = property.split(';').next().unwrap_or(property);
        let key = match name {
            "FN" => TITLE,
            "DESCRIPTION" => DESCRIPTION,
            "PHOTO" => AVATAR,
            "RDV_ACCOUNT" => RDV_ACCOUNT,
            "RDV_DEVICE" => RDV_DEVICE,
            _ => continue,
        };
        infos.insert(key.to_string(), value.to_string());
    }
    infos
}
