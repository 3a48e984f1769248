use indexmap::IndexMap;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const MAIN_CLASS: &str = "Main-Class";
pub const CREATED_BY: &str = "Created-By";
pub const IMPLEMENTATION_TITLE: &str = "Implementation-Title";
pub const IMPLEMENTATION_VERSION: &str = "Implementation-Version";

/// The manifest written as the first entry of the output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputManifest {
    pub entry_point: String,
    /// Main-section attributes in output order, `Main-Class` included.
    pub attributes: IndexMap<String, String>,
}
