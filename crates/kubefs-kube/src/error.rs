//! Error types for kubefs-kube.

use thiserror::Error;

/// Result type for kubefs-kube operations.
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to the cluster API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error, carries the HTTP status for the error mapper.
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Discovery found no matching resource for a (group, kind) pair.
    #[error("no resource descriptor for kind '{kind}' in group '{group}'")]
    UnknownKind { group: String, kind: String },

    /// A manifest fetched or submitted could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The watch stream ended or errored and could not be restarted.
    #[error("watch stream failed: {0}")]
    Watch(String),

    /// IO error surfaced while building client config.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure constructing a `kube::Client` from the selected config source.
    #[error("client configuration error: {0}")]
    ClientConfig(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// HTTP status code carried by an API error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if this is a conflict error (409).
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    /// Check if this is a bad request (400).
    pub fn is_bad_request(&self) -> bool {
        self.status_code() == Some(400)
    }

    /// Check if this is an invalid-manifest rejection (422).
    pub fn is_invalid_manifest(&self) -> bool {
        self.status_code() == Some(422)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_api_errors_have_no_status_code() {
        let err = KubeError::UnknownKind {
            group: "apps".to_string(),
            kind: "Widget".to_string(),
        };
        assert_eq!(err.status_code(), None);
        assert!(!err.is_not_found());
    }
}
