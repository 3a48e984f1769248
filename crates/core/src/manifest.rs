//! Output manifest synthesis.
//!
//! Input manifests are never copied. They are only mined for the attributes
//! the configuration names as pass-through; everything else is written fresh.

use indexmap::IndexMap;
use shadejar_api::{
    CREATED_BY, IMPLEMENTATION_TITLE, IMPLEMENTATION_VERSION, MAIN_CLASS, MANIFEST_VERSION,
    ManifestSettings, OutputManifest,
};
use tracing::{debug, warn};

const MAX_LINE_BYTES: usize = 72;
const RESERVED: [&str; 3] = [MANIFEST_VERSION, CREATED_BY, MAIN_CLASS];

/// Main-section attributes of a manifest, in file order. Continuation lines
/// (leading space) are folded into the previous value.
pub fn parse_main_attributes(bytes: &[u8]) -> IndexMap<String, String> {
    let text = String::from_utf8_lossy(bytes);
    let mut attributes: IndexMap<String, String> = IndexMap::new();
    let mut last_key: Option<String> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(value) = last_key.as_ref().and_then(|k| attributes.get_mut(k)) {
                value.push_str(continuation);
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.strip_prefix(' ').unwrap_or(value).to_string();
        attributes.insert(key.clone(), value);
        last_key = Some(key);
    }
    attributes
}

fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Builds the output manifest. `inputs` are the input manifests in rank
/// order; for each pass-through attribute the first input defining it wins.
pub fn synthesize(
    settings: &ManifestSettings,
    entry_point: &str,
    inputs: &[Vec<u8>],
) -> OutputManifest {
    let mut attributes = IndexMap::new();
    attributes.insert(MANIFEST_VERSION.to_string(), "1.0".to_string());
    attributes.insert(
        CREATED_BY.to_string(),
        format!("shadejar {}", env!("CARGO_PKG_VERSION")),
    );
    attributes.insert(MAIN_CLASS.to_string(), entry_point.to_string());
    if let Some(title) = &settings.title {
        attributes.insert(IMPLEMENTATION_TITLE.to_string(), title.clone());
    }
    if let Some(version) = &settings.version {
        attributes.insert(IMPLEMENTATION_VERSION.to_string(), version.clone());
    }

    if !settings.pass_through.is_empty() {
        let parsed: Vec<IndexMap<String, String>> =
            inputs.iter().map(|m| parse_main_attributes(m)).collect();
        for name in &settings.pass_through {
            if is_reserved(name) {
                warn!("Ignoring pass-through of reserved manifest attribute {}", name);
                continue;
            }
            let found = parsed.iter().find_map(|attrs| {
                attrs
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value.clone())
            });
            match found {
                Some(value) => {
                    attributes.insert(name.clone(), value);
                }
                None => debug!("Pass-through attribute {} not present in any input", name),
            }
        }
    }

    for (name, value) in &settings.attributes {
        if is_reserved(name) {
            warn!("Ignoring configured manifest attribute {}", name);
            continue;
        }
        attributes.insert(name.clone(), value.clone());
    }

    OutputManifest {
        entry_point: entry_point.to_string(),
        attributes,
    }
}

/// Serializes the main section with CRLF line endings, wrapping lines at 72
/// bytes with single-space continuations.
pub fn render(manifest: &OutputManifest) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in &manifest.attributes {
        let line = format!("{name}: {value}");
        let mut rest = line.as_str();
        let mut limit = MAX_LINE_BYTES;
        loop {
            let cut = floor_char_boundary(rest, limit);
            out.extend_from_slice(rest[..cut].as_bytes());
            out.extend_from_slice(b"\r\n");
            rest = &rest[cut..];
            if rest.is_empty() {
                break;
            }
            out.push(b' ');
            limit = MAX_LINE_BYTES - 1;
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn floor_char_boundary(s: &str, limit: usize) -> usize {
    if s.len() <= limit {
        return s.len();
    }
    let mut cut = limit;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_folds_continuations_and_stops_at_sections() {
        let manifest = b"Manifest-Version: 1.0\r\nMain-Class: com.example.Ver\r\n yLongMain\r\nMulti-Release: true\r\n\r\nName: com/example/\r\nSealed: true\r\n";
        let attrs = parse_main_attributes(manifest);
        assert_eq!(attrs.get("Main-Class").unwrap(), "com.example.VeryLongMain");
        assert_eq!(attrs.get("Multi-Release").unwrap(), "true");
        assert!(attrs.get("Sealed").is_none());
    }

    #[test]
    fn test_synthesize_order_and_pass_through() {
        let settings = ManifestSettings {
            title: Some("demo".to_string()),
            version: Some("1.2.0".to_string()),
            pass_through: vec!["Multi-Release".to_string(), "Main-Class".to_string()],
            attributes: [("Add-Opens".to_string(), "java.base/java.lang".to_string())]
                .into_iter()
                .collect(),
        };
        let inputs = vec![
            b"Manifest-Version: 1.0\nMain-Class: app.Other\n".to_vec(),
            b"Manifest-Version: 1.0\nmulti-release: true\n".to_vec(),
            b"Manifest-Version: 1.0\nMulti-Release: false\n".to_vec(),
        ];

        let manifest = synthesize(&settings, "net.minestom.demo.Main", &inputs);
        let keys: Vec<&str> = manifest.attributes.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "Manifest-Version",
                "Created-By",
                "Main-Class",
                "Implementation-Title",
                "Implementation-Version",
                "Multi-Release",
                "Add-Opens",
            ]
        );
        assert_eq!(manifest.attributes["Main-Class"], "net.minestom.demo.Main");
        assert_eq!(manifest.attributes["Multi-Release"], "true");
    }

    #[test]
    fn test_render_wraps_long_lines() {
        let mut attributes = IndexMap::new();
        attributes.insert("Class-Path".to_string(), "x".repeat(150));
        let manifest = OutputManifest {
            entry_point: "Main".to_string(),
            attributes,
        };

        let rendered = render(&manifest);
        let text = String::from_utf8(rendered.clone()).unwrap();
        for line in text.split("\r\n") {
            assert!(line.len() <= 72, "{line}");
        }
        assert!(text.ends_with("\r\n\r\n"));

        let reparsed = parse_main_attributes(&rendered);
        assert_eq!(reparsed["Class-Path"], "x".repeat(150));
    }
}
