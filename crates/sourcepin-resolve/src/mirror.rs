use sourcepin_schema::ImageReference;
use std::fmt;

/// Public mirrors of Docker Hub official images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    /// AWS ECR Public Gallery: `public.ecr.aws/docker/library/<name>`.
    EcrPublic,
    /// Microsoft Artifact Registry: `mcr.microsoft.com/mirror/docker/library/<name>`.
    Mcr,
}

impl Mirror {
    pub fn registry(self) -> &'static str {
        match self {
            Self::EcrPublic => "public.ecr.aws",
            Self::Mcr => "mcr.microsoft.com",
        }
    }

    fn path_prefix(self) -> &'static str {
        match self {
            Self::EcrPublic => "docker/",
            Self::Mcr => "mirror/docker/",
        }
    }

    /// The mirrored form of `image`, keeping its tag. Only Docker Hub official
    /// images (`docker.io/library/*`) are mirrored.
    pub fn map(self, image: &ImageReference) -> Option<ImageReference> {
        if !image.is_docker_official() {
            return None;
        }
        let path = format!("{}{}", self.path_prefix(), image.path());
        Some(image.rehome(self.registry(), &path))
    }
}

impl fmt::Display for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EcrPublic => f.write_str("ECR Public"),
            Self::Mcr => f.write_str("MCR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(reference: &str) -> ImageReference {
        ImageReference::parse(reference).unwrap()
    }

    #[test]
    fn ecr_public_mapping() {
        let mapped = Mirror::EcrPublic.map(&image("alpine:3.18")).unwrap();
        assert_eq!(mapped.to_string(), "public.ecr.aws/docker/library/alpine:3.18");
        assert_eq!(mapped.domain(), "public.ecr.aws");
    }

    #[test]
    fn mcr_mapping() {
        let mapped = Mirror::Mcr.map(&image("docker.io/library/golang:1.22")).unwrap();
        assert_eq!(
            mapped.to_string(),
            "mcr.microsoft.com/mirror/docker/library/golang:1.22"
        );
    }

    #[test]
    fn untagged_stays_untagged() {
        let mapped = Mirror::Mcr.map(&image("node")).unwrap();
        assert_eq!(mapped.to_string(), "mcr.microsoft.com/mirror/docker/library/node");
        assert_eq!(mapped.tag(), None);
    }

    #[test]
    fn only_official_images_are_mirrored() {
        assert!(Mirror::EcrPublic.map(&image("bitnami/redis:7")).is_none());
        assert!(Mirror::Mcr.map(&image("ghcr.io/o/app:1")).is_none());
        assert!(Mirror::EcrPublic.map(&image("quay.io/library/x")).is_none());
    }
}
