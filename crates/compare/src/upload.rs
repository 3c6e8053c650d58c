use std::path::PathBuf;

/// A file received from a client and staged on disk, waiting to be compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Where the upload layer wrote the file.
    pub staged: PathBuf,
    /// The file name the client sent. Only used to name the cached copy.
    pub original_name: String,
}
impl Upload {
    pub fn new(staged: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self { staged: staged.into(), original_name: original_name.into() }
    }
}
