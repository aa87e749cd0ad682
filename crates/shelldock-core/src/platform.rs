//! Platform detection
//!
//! Commands can carry per-platform variants keyed by a normalized name:
//! a Linux distribution (`ubuntu`, `arch`, ...), `darwin` or `windows`.

use std::path::Path;
use tracing::debug;

/// Known distribution ids and the name they normalize to
const DISTROS: &[(&str, &str)] = &[
    ("ubuntu", "ubuntu"),
    ("debian", "debian"),
    ("centos", "centos"),
    ("rhel", "rhel"),
    ("redhat", "rhel"),
    ("fedora", "fedora"),
    ("archlinux", "arch"),
    ("arch", "arch"),
    ("opensuse-leap", "opensuse"),
    ("opensuse-tumbleweed", "opensuse"),
    ("opensuse", "opensuse"),
    ("suse", "opensuse"),
    ("alpine", "alpine"),
    ("amazon", "amazon"),
    ("oracle", "oracle"),
];

/// Marker files checked when /etc/os-release says nothing useful
const MARKERS: &[(&str, &str)] = &[
    ("/etc/debian_version", "debian"),
    ("/etc/redhat-release", "centos"),
    ("/etc/arch-release", "arch"),
    ("/etc/SuSE-release", "opensuse"),
];

/// Detect the current platform
pub fn detect() -> String {
    let platform = if cfg!(target_os = "macos") {
        "darwin".to_string()
    } else if cfg!(target_os = "windows") {
        "windows".to_string()
    } else {
        detect_linux_distribution()
    };
    debug!(%platform, "detected platform");
    platform
}

/// Detect the Linux distribution, falling back to plain "linux"
pub fn detect_linux_distribution() -> String {
    if let Ok(content) = std::fs::read_to_string("/etc/os-release") {
        if let Some(distro) = parse_os_release(&content) {
            return distro;
        }
    }

    MARKERS
        .iter()
        .find(|(path, _)| Path::new(path).exists())
        .map(|(_, distro)| distro.to_string())
        .unwrap_or_else(|| "linux".to_string())
}

/// Extract a normalized distribution from os-release content (ID, then ID_LIKE)
pub fn parse_os_release(content: &str) -> Option<String> {
    let mut id = None;
    let mut id_like = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("ID=") {
            id = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = line.strip_prefix("ID_LIKE=") {
            id_like = Some(value.trim_matches('"').to_string());
        }
    }

    id.as_deref()
        .and_then(normalize)
        .or_else(|| {
            id_like
                .as_deref()
                .and_then(|like| like.split_whitespace().find_map(normalize))
        })
}

/// Normalize a distribution id to a common name
pub fn normalize(id: &str) -> Option<String> {
    let id = id.to_lowercase();

    if let Some((_, name)) = DISTROS.iter().find(|(key, _)| *key == id) {
        return Some(name.to_string());
    }

    DISTROS
        .iter()
        .find(|(key, _)| id.contains(key))
        .map(|(_, name)| name.to_string())
}
