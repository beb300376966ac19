//! Artifact URI handling.
//!
//! Runs report their artifact root either behind the tracking server's
//! artifact proxy (`mlflow-artifacts:/…`) or as a local filesystem path
//! (`file:///…` or a bare absolute path).

use crate::tracking::TrackingError;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactLocation {
    /// Path below `/api/2.0/mlflow-artifacts/artifacts/`.
    Proxied(String),
    Local(PathBuf),
}

impl ArtifactLocation {
    pub fn parse(uri: &str) -> Result<Self, TrackingError> {
        if let Some(rest) = uri.strip_prefix("mlflow-artifacts:") {
            // mlflow-artifacts:/path or mlflow-artifacts://host:port/path
            let path = match rest.strip_prefix("//") {
                Some(with_host) => with_host.split_once('/').map_or("", |(_, p)| p),
                None => rest,
            };
            return Ok(Self::Proxied(path.trim_matches('/').to_string()));
        }
        if uri.starts_with("file:") {
            let url = url::Url::parse(uri)
                .map_err(|_| TrackingError::UnsupportedArtifactUri(uri.to_string()))?;
            return url
                .to_file_path()
                .map(Self::Local)
                .map_err(|_| TrackingError::UnsupportedArtifactUri(uri.to_string()));
        }
        if uri.starts_with('/') {
            return Ok(Self::Local(PathBuf::from(uri)));
        }
        Err(TrackingError::UnsupportedArtifactUri(uri.to_string()))
    }

    /// Location of `relative` below this one. An empty `relative` is this location.
    pub fn join(&self, relative: &str) -> Self {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            return self.clone();
        }
        match self {
            Self::Proxied(base) if base.is_empty() => Self::Proxied(relative.to_string()),
            Self::Proxied(base) => Self::Proxied(format!("{base}/{relative}")),
            Self::Local(base) => Self::Local(base.join(relative)),
        }
    }

    /// Percent-encoded proxy path, one segment at a time.
    pub fn encoded_proxy_path(path: &str) -> String {
        path.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxied_forms() {
        assert_eq!(
            ArtifactLocation::parse("mlflow-artifacts:/1/abc/artifacts").unwrap(),
            ArtifactLocation::Proxied("1/abc/artifacts".into())
        );
        assert_eq!(
            ArtifactLocation::parse("mlflow-artifacts://tracker:5000/1/abc/artifacts").unwrap(),
            ArtifactLocation::Proxied("1/abc/artifacts".into())
        );
    }

    #[test]
    fn test_local_forms() {
        assert_eq!(
            ArtifactLocation::parse("file:///srv/mlruns/1/abc/artifacts").unwrap(),
            ArtifactLocation::Local(PathBuf::from("/srv/mlruns/1/abc/artifacts"))
        );
        assert_eq!(
            ArtifactLocation::parse("/srv/mlruns/1").unwrap(),
            ArtifactLocation::Local(PathBuf::from("/srv/mlruns/1"))
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            ArtifactLocation::parse("s3://bucket/1/abc"),
            Err(TrackingError::UnsupportedArtifactUri(_))
        ));
    }

    #[test]
    fn test_join() {
        let base = ArtifactLocation::Proxied("1/abc/artifacts".into());
        assert_eq!(
            base.join("model/model.json"),
            ArtifactLocation::Proxied("1/abc/artifacts/model/model.json".into())
        );
        assert_eq!(base.join(""), base);
        assert_eq!(
            ArtifactLocation::Local(PathBuf::from("/tmp/a")).join("/model.json"),
            ArtifactLocation::Local(PathBuf::from("/tmp/a/model.json"))
        );
    }

    #[test]
    fn test_encoded_proxy_path() {
        assert_eq!(
            ArtifactLocation::encoded_proxy_path("1/run id/model.json"),
            "1/run%20id/model.json"
        );
    }
}
