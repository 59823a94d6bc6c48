use std::io;
use std::path::Path;

use crate::error::{LinkError, SampleError};

/// Trimmed contents of a kernel attribute file; `None` if it does not exist.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, SampleError> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LinkError::Unavailable {
            address: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

/// Like [`read_optional`], but a missing file means the source is unavailable.
pub(crate) async fn read_required(path: &Path) -> Result<String, SampleError> {
    read_optional(path).await?.ok_or_else(|| {
        LinkError::Unavailable {
            address: path.display().to_string(),
            reason: "attribute missing".into(),
        }
        .into()
    })
}
