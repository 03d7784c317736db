//! Image URL construction for storage keys

use once_cell::sync::Lazy;
use regex::Regex;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

/// Shape of an internal comic key (hid), checked structurally only
static INTERNAL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").expect("internal key pattern is valid"));

/// Whether an identifier already looks like an internal key
pub fn is_internal_key(id: &str) -> bool {
    INTERNAL_KEY.is_match(id)
}

/// Whether a string is a ready-to-use http(s) URL
pub fn is_absolute_url(candidate: &str) -> bool {
    let lower = candidate.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Image host that storage keys are resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHost {
    base: String,
}

impl ImageHost {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Build a URL from a storage key.
    ///
    /// Leading slashes are stripped and `.jpg` is appended unless the key
    /// already ends in a known image extension. Empty keys yield `None`.
    pub fn build(&self, key: &str) -> Option<String> {
        let key = key.trim().trim_start_matches('/');
        if key.is_empty() {
            return None;
        }

        let lower = key.to_ascii_lowercase();
        let has_extension = IMAGE_EXTENSIONS
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")));

        if has_extension {
            Some(format!("{}/{}", self.base, key))
        } else {
            Some(format!("{}/{}.jpg", self.base, key))
        }
    }

    /// Absolute URLs pass through unchanged; anything else is a storage key
    pub fn resolve(&self, candidate: &str) -> Option<String> {
        let candidate = candidate.trim();
        if is_absolute_url(candidate) {
            return Some(candidate.to_string());
        }
        self.build(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ImageHost {
        ImageHost::new("https://meo.comick.pictures/")
    }

    #[test]
    fn test_build_appends_jpg() {
        assert_eq!(
            host().build("abc/def").as_deref(),
            Some("https://meo.comick.pictures/abc/def.jpg")
        );
    }

    #[test]
    fn test_build_keeps_known_extension() {
        assert_eq!(
            host().build("abc/def.png").as_deref(),
            Some("https://meo.comick.pictures/abc/def.png")
        );
        assert_eq!(
            host().build("abc/def.WEBP").as_deref(),
            Some("https://meo.comick.pictures/abc/def.WEBP")
        );
    }

    #[test]
    fn test_build_strips_leading_slashes() {
        assert_eq!(
            host().build("///x.gif").as_deref(),
            Some("https://meo.comick.pictures/x.gif")
        );
    }

    #[test]
    fn test_build_unknown_extension_gets_jpg() {
        assert_eq!(
            host().build("cover.bmp").as_deref(),
            Some("https://meo.comick.pictures/cover.bmp.jpg")
        );
    }

    #[test]
    fn test_build_empty_key() {
        assert_eq!(host().build(""), None);
        assert_eq!(host().build("//"), None);
    }

    #[test]
    fn test_resolve_absolute_bypasses_construction() {
        assert_eq!(host().resolve("https://x/y.png").as_deref(), Some("https://x/y.png"));
        assert_eq!(host().resolve("HTTP://x/y").as_deref(), Some("HTTP://x/y"));
    }

    #[test]
    fn test_internal_key_shape() {
        assert!(is_internal_key("Ab3dE_fGh-1"));
        assert!(is_internal_key("0123456789"));
        assert!(!is_internal_key("short"));
        assert!(!is_internal_key("has space in it"));
        assert!(!is_internal_key("slug.with.dots"));
        assert!(!is_internal_key(""));
    }
}
