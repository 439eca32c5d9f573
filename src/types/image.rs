// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;

/// A container image reference split into repository, tag and digest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Split `repo:tag` or `registry:port/name:tag`.
    ///
    /// The tag is whatever follows the last colon, unless that colon sits before the
    /// last `/`, in which case it is a registry port and there is no tag. A digest
    /// (`@sha256:...`) is split off first and kept on its own.
    pub fn parse(reference: &str) -> Self {
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => (name, Some(digest)),
            None => (reference, None),
        };

        let last_slash = name.rfind('/');
        let (repository, tag) = match name.rfind(':') {
            Some(colon) if last_slash.map_or(true, |slash| colon > slash) => {
                (&name[..colon], Some(name[colon + 1..].to_string()))
            }
            _ => (name, None),
        };

        ImageReference {
            repository: repository.to_string(),
            tag: tag.filter(|t| !t.is_empty()),
            digest: digest.filter(|d| !d.is_empty()).map(str::to_string),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_and_tag() {
        let image = ImageReference::parse("public.ecr.aws/lumigo/lumigo-autotrace:1.2.3");
        assert_eq!(image.repository, "public.ecr.aws/lumigo/lumigo-autotrace");
        assert_eq!(image.tag.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn test_parse_registry_port_with_tag() {
        let image = ImageReference::parse("localhost:5000/lumigo-injector:latest");
        assert_eq!(image.repository, "localhost:5000/lumigo-injector");
        assert_eq!(image.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn test_parse_registry_port_without_tag() {
        let image = ImageReference::parse("localhost:5000/lumigo-injector");
        assert_eq!(image.repository, "localhost:5000/lumigo-injector");
        assert_eq!(image.tag, None);
    }

    #[test]
    fn test_parse_bare_name() {
        let image = ImageReference::parse("busybox");
        assert_eq!(image.repository, "busybox");
        assert_eq!(image.tag, None);
    }

    #[test]
    fn test_parse_digest() {
        let image = ImageReference::parse("lumigo/injector@sha256:abcdef");
        assert_eq!(image.repository, "lumigo/injector");
        assert_eq!(image.tag, None);
        assert_eq!(image.digest.as_deref(), Some("sha256:abcdef"));
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let image =
            ImageReference::parse("public.ecr.aws/lumigo/lumigo-autotrace:1.2.3@sha256:abcdef");
        assert_eq!(image.repository, "public.ecr.aws/lumigo/lumigo-autotrace");
        assert_eq!(image.tag.as_deref(), Some("1.2.3"));
        assert_eq!(image.digest.as_deref(), Some("sha256:abcdef"));
    }

    #[test]
    fn test_display_recombines() {
        for reference in [
            "localhost:5000/lumigo-injector:latest",
            "busybox",
            "repo/x:1",
            "lumigo/injector@sha256:abcdef",
            "public.ecr.aws/lumigo/lumigo-autotrace:1.2.3@sha256:abcdef",
            "localhost:5000/lumigo-injector:latest@sha256:abcdef",
        ] {
            assert_eq!(ImageReference::parse(reference).to_string(), reference);
        }
    }
}
