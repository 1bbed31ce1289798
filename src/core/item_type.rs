//! Item type names used by the portal.
//!
//! Item types are open-ended strings in the portal data model ("Web Map",
//! "Feature Service", ...). Converter lookup is keyed by the lower-cased type
//! name; the constants below are the types the built-in converters handle.

/// Group (shares an id space with items)
pub const GROUP: &str = "Group";
/// Hosted feature service
pub const FEATURE_SERVICE: &str = "Feature Service";
/// Web map
pub const WEB_MAP: &str = "Web Map";
/// Configurable web application
pub const WEB_MAPPING_APPLICATION: &str = "Web Mapping Application";
/// Operations dashboard
pub const DASHBOARD: &str = "Dashboard";
/// Solution container item
pub const SOLUTION: &str = "Solution";

/// Types copied verbatim: metadata and data, no references to rewrite.
pub const PASS_THROUGH_TYPES: &[&str] = &[
    "Document Link",
    "PDF",
    "Microsoft Word",
    "Microsoft Excel",
    "Microsoft Powerpoint",
    "Image",
    "CSV",
    "Code Attachment",
    "Desktop Application Template",
    "Map Template",
    "Project Template",
];

/// Types known to exist that this tool deliberately cannot template.
pub const UNSUPPORTED_TYPES: &[&str] = &[
    "Geoprocessing Service",
    "Map Service",
    "Image Service",
    "Vector Tile Service",
    "Scene Service",
    "Workforce Project",
];

/// Tag marking an item as the source of its container's thumbnail.
pub const THUMBNAIL_SOURCE_TAG: &str = "deploy.thumbnail";

/// Normalize a type name into its registry key.
#[must_use]
pub fn type_key(item_type: &str) -> String {
    item_type.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_key_is_case_and_whitespace_insensitive() {
        assert_eq!(type_key(" Web Map "), "web map");
        assert_eq!(type_key(FEATURE_SERVICE), type_key("feature service"));
    }
}
