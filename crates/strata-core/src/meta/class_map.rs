//! Class-name mapping.
//!
//! Mapped names are the short, convention-stripped type names used as
//! collection names and discriminator segments. At most one prefix and one
//! suffix are stripped; the first configured match wins.

/// Configurable prefix/suffix stripping for type and namespace names.
#[derive(Clone, Debug)]
pub struct ClassMapSettings {
    pub ignored_namespace_prefixes: Vec<String>,
    pub ignored_namespace_suffixes: Vec<String>,
    pub ignored_class_name_prefixes: Vec<String>,
    pub ignored_class_name_suffixes: Vec<String>,
}

impl Default for ClassMapSettings {
    fn default() -> Self {
        Self {
            ignored_namespace_prefixes: vec!["strata".to_string()],
            ignored_namespace_suffixes: Vec::new(),
            ignored_class_name_prefixes: Vec::new(),
            ignored_class_name_suffixes: vec!["Data".to_string(), "Key".to_string()],
        }
    }
}

impl ClassMapSettings {
    /// Settings that strip nothing, for tests that want raw names.
    pub fn identity() -> Self {
        Self {
            ignored_namespace_prefixes: Vec::new(),
            ignored_namespace_suffixes: Vec::new(),
            ignored_class_name_prefixes: Vec::new(),
            ignored_class_name_suffixes: Vec::new(),
        }
    }

    pub fn map_class_name(&self, name: &str) -> String {
        let mut mapped = name;
        for prefix in &self.ignored_class_name_prefixes {
            if let Some(rest) = mapped.strip_prefix(prefix.as_str()) {
                if !rest.is_empty() {
                    mapped = rest;
                }
                break;
            }
        }
        for suffix in &self.ignored_class_name_suffixes {
            if let Some(rest) = mapped.strip_suffix(suffix.as_str()) {
                if !rest.is_empty() {
                    mapped = rest;
                }
                break;
            }
        }
        mapped.to_string()
    }

    pub fn map_namespace(&self, namespace: &str) -> String {
        let mut mapped = namespace;
        for prefix in &self.ignored_namespace_prefixes {
            if mapped == prefix {
                mapped = "";
                break;
            }
            if let Some(rest) = mapped.strip_prefix(&format!("{prefix}::")) {
                mapped = rest;
                break;
            }
        }
        for suffix in &self.ignored_namespace_suffixes {
            if mapped == suffix {
                mapped = "";
                break;
            }
            if let Some(rest) = mapped.strip_suffix(&format!("::{suffix}")) {
                mapped = rest;
                break;
            }
        }
        mapped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_suffix_first_match_wins() {
        let settings = ClassMapSettings::default();
        assert_eq!(settings.map_class_name("BaseSampleData"), "BaseSample");
        assert_eq!(settings.map_class_name("BaseSampleKey"), "BaseSample");
        // Only one suffix is stripped.
        assert_eq!(settings.map_class_name("SampleDataKey"), "SampleData");
        // Never strip down to nothing.
        assert_eq!(settings.map_class_name("Data"), "Data");
        // No match leaves the name alone.
        assert_eq!(settings.map_class_name("DataSet"), "DataSet");
    }

    #[test]
    fn strips_namespace_prefix_on_separator_boundary() {
        let settings = ClassMapSettings::default();
        assert_eq!(settings.map_namespace("strata::samples"), "samples");
        assert_eq!(settings.map_namespace("strata"), "");
        assert_eq!(settings.map_namespace("stratagem::samples"), "stratagem::samples");
    }
}
