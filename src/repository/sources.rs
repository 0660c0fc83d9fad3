// src/repository/sources.rs

//! APT sources file content for the StorPool repository
//!
//! The dedicated sources file holds a mandatory `deb` line and a
//! commented-out `deb-src` line for the same URL. Matching is structural:
//! a file only counts as ours if every non-blank line is one of those two
//! (the optional one possibly commented out) and the mandatory line is there.

/// Distribution codename the repository is published for
pub const DISTRIBUTION: &str = "xenial";

/// Repository component
pub const COMPONENT: &str = "main";

/// Superseded repository URLs that must not linger in the global sources file
pub const LEGACY_URLS: [&str; 4] = [
    "https://debian.ringlet.net/storpool-maas",
    "https://debian.ringlet.net/storpool-juju",
    "http://repo.storpool.com/storpool-maas",
    "@repo.storpool.com/storpool-maas",
];

/// The repository an agent is configured to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    pub url: String,
}

impl RepoDescriptor {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim().to_string(),
        }
    }

    /// The `deb` line that must be present
    pub fn mandatory_line(&self) -> String {
        format!("deb {} {} {}", self.url, DISTRIBUTION, COMPONENT)
    }

    /// The `deb-src` line that may be present, commented out or not
    pub fn optional_line(&self) -> String {
        format!("deb-src {} {} {}", self.url, DISTRIBUTION, COMPONENT)
    }

    /// Full content of the dedicated sources file
    pub fn file_contents(&self) -> String {
        format!("{}\n# {}\n", self.mandatory_line(), self.optional_line())
    }

    /// Check whether `content` is a sources file for this repository
    pub fn matches_contents(&self, content: &str) -> bool {
        let mandatory = self.mandatory_line();
        let optional = self.optional_line();
        let mut found_mandatory = false;

        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if line == mandatory {
                found_mandatory = true;
                continue;
            }

            let uncommented = line.strip_prefix('#').map(str::trim).unwrap_or(line);
            if uncommented != optional {
                return false;
            }
        }

        found_mandatory
    }
}

/// True if `line` refers to one of the superseded repository URLs
pub fn is_legacy_line(line: &str) -> bool {
    LEGACY_URLS.iter().any(|url| line.contains(url))
}
