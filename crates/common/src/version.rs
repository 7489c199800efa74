//! Version reporting, the analogue of `qv_version`/`qv_version_string`.

/// The crate version at build time, `CARGO_PKG_VERSION` of the workspace.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// `{major, minor, patch}`, parsed out of [`version`].
pub fn version_triple() -> (u32, u32, u32) {
    let mut parts = version().split('.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (major, minor, patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_triple_parses_cargo_version() {
        let (major, _, _) = version_triple();
        assert_eq!(major, 0);
    }
}
