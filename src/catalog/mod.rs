//! Known PaperMC builds and where to download them from.

/// Built-in version labels and the jar download URL of a pinned build of
/// each. The first entry is the default selection.
static BUILTIN_VERSIONS: [(&'static str, &'static str); 5] = [
    (
        "1.21.1",
        "https://api.papermc.io/v2/projects/paper/versions/1.21.1/builds/132/downloads/paper-1.21.1-132.jar",
    ),
    (
        "1.21.4",
        "https://api.papermc.io/v2/projects/paper/versions/1.21.4/builds/173/downloads/paper-1.21.4-173.jar",
    ),
    (
        "1.16.5",
        "https://api.papermc.io/v2/projects/paper/versions/1.16.5/builds/794/downloads/paper-1.16.5-794.jar",
    ),
    (
        "1.17.1",
        "https://api.papermc.io/v2/projects/paper/versions/1.17.1/builds/318/downloads/paper-1.17.1-318.jar",
    ),
    (
        "1.8.8/1.8.9",
        "https://api.papermc.io/v2/projects/paper/versions/1.8.8/builds/445/downloads/paper-1.8.8-445.jar",
    ),
];

/// Mapping from human readable version labels to download URLs.
///
/// Built once at startup and never mutated afterwards; share it behind an
/// `Arc` if needed.
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    /// Insertion ordered, labels unique.
    entries: Vec<(String, String)>,
}

impl VersionCatalog {
    /// Catalog with only the built-in versions.
    pub fn builtin() -> Self {
        let entries: Vec<(String, String)> = BUILTIN_VERSIONS
            .iter()
            .map(|(label, url)| (label.to_string(), url.to_string()))
            .collect();
        return Self { entries };
    }

    /// Catalog with the built-in versions plus `extra`. An extra label that
    /// matches a built-in one replaces its URL in place; new labels are
    /// appended in the order given.
    pub fn with_overrides<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut catalog: VersionCatalog = Self::builtin();
        for (label, url) in extra {
            match catalog.entries.iter_mut().find(|(l, _)| *l == label) {
                Some(existing) => {
                    log::debug!("Version {label} download URL overridden by configuration");
                    existing.1 = url;
                }
                None => catalog.entries.push((label, url)),
            }
        }
        return catalog;
    }

    /// Look up the download URL of a version label.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        return self
            .entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, url)| url.as_str());
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        return self.entries.iter().map(|(label, _)| label.as_str());
    }

    /// Label offered when the user does not pick one.
    pub fn default_label(&self) -> Option<&str> {
        return self.entries.first().map(|(label, _)| label.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_label_resolves_to_a_jar_url() {
        let catalog = VersionCatalog::builtin();
        let labels: Vec<&str> = catalog.labels().collect();
        assert_eq!(labels.len(), 5);
        for label in labels {
            let url = catalog.resolve(label).expect("builtin label should resolve");
            assert!(url.starts_with("https://api.papermc.io/"), "{url}");
            assert!(url.ends_with(".jar"), "{url}");
        }
    }

    #[test]
    fn test_unknown_label_is_absent() {
        let catalog = VersionCatalog::builtin();
        assert_eq!(catalog.resolve("1.99"), None);
        assert_eq!(catalog.resolve(""), None);
        assert_eq!(catalog.resolve("1.8.8"), None, "labels match exactly");
    }

    #[test]
    fn test_overrides_replace_and_append() {
        let catalog = VersionCatalog::with_overrides(vec![
            ("1.21.1".to_string(), "http://mirror.local/paper-1.21.1.jar".to_string()),
            ("1.21.3".to_string(), "http://mirror.local/paper-1.21.3.jar".to_string()),
        ]);
        assert_eq!(
            catalog.resolve("1.21.1"),
            Some("http://mirror.local/paper-1.21.1.jar")
        );
        assert_eq!(
            catalog.resolve("1.21.3"),
            Some("http://mirror.local/paper-1.21.3.jar")
        );
        assert_eq!(catalog.default_label(), Some("1.21.1"));
        assert_eq!(catalog.labels().last(), Some("1.21.3"));
    }
}
