use shadejar_api::{EntryTag, MANIFEST_PATH};

pub const META_INF: &str = "META-INF/";
pub const SERVICES_DIR: &str = "META-INF/services/";
pub const CLASS_SUFFIX: &str = ".class";

const SIGNATURE_SUFFIXES: [&str; 4] = [".SF", ".DSA", ".RSA", ".EC"];

/// Decides how an archive path is handled. Rules are checked in priority
/// order; the first match wins.
pub fn classify(path: &str) -> EntryTag {
    if path.ends_with('/') {
        EntryTag::Directory
    } else if is_signature_file(path) {
        EntryTag::SignatureFile
    } else if path.eq_ignore_ascii_case(MANIFEST_PATH) {
        EntryTag::TopLevelManifest
    } else if service_name(path).is_some() {
        EntryTag::ServiceRegistration
    } else if path.ends_with(CLASS_SUFFIX) {
        EntryTag::BinaryUnit
    } else {
        EntryTag::OrdinaryResource
    }
}

/// Signing metadata lives directly under `META-INF/`.
fn is_signature_file(path: &str) -> bool {
    let Some(name) = strip_prefix_ignore_case(path, META_INF) else {
        return false;
    };
    if name.is_empty() || name.contains('/') {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    upper.starts_with("SIG-") || SIGNATURE_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

/// The service key of a `META-INF/services/<key>` path.
pub fn service_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix(SERVICES_DIR)?;
    if name.is_empty() || name.contains('/') {
        None
    } else {
        Some(name)
    }
}

fn strip_prefix_ignore_case<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let head = path.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&path[prefix.len()..])
    } else {
        None
    }
}
