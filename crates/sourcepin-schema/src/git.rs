use crate::SchemaError;

/// Ref resolved when a git URL carries no fragment, or an empty ref.
pub const DEFAULT_REF: &str = "HEAD";

/// A git source in `<remote>#<ref>[:<subdir>]` form.
///
/// ```text
/// https://github.com/owner/repo.git#v1.0.0:docs
/// └─────────── remote ─────────────┘ └ref─┘ └subdir
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitReference {
    original: String,
    remote: String,
    reference: String,
    subdir: Option<String>,
}

impl GitReference {
    /// Split a git URL into remote, ref and subdirectory. A URL without a
    /// fragment resolves [`DEFAULT_REF`].
    ///
    /// The remote ends up on a `git` command line, so an empty remote or one
    /// that git would read as an option is rejected.
    pub fn parse(original: &str) -> Result<Self, SchemaError> {
        let (remote, fragment) = match original.split_once('#') {
            Some((remote, fragment)) => (remote, fragment),
            None => (original, ""),
        };
        let invalid = |reason: &str| SchemaError::InvalidGitReference {
            reference: original.to_owned(),
            reason: reason.to_owned(),
        };
        if remote.trim().is_empty() {
            return Err(invalid("empty remote"));
        }
        if remote.starts_with('-') {
            return Err(invalid("remote must not start with '-'"));
        }

        let (reference, subdir) = match fragment.split_once(':') {
            Some((reference, subdir)) => (reference, Some(subdir)),
            None => (fragment, None),
        };
        let reference = if reference.is_empty() {
            DEFAULT_REF
        } else {
            reference
        };

        Ok(Self {
            original: original.to_owned(),
            remote: remote.to_owned(),
            reference: reference.to_owned(),
            subdir: subdir.filter(|s| !s.is_empty()).map(str::to_owned),
        })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Branch, tag or commit named by the fragment.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The annotated-tag dereference form, `<ref>^{}`.
    pub fn peeled_reference(&self) -> String {
        format!("{}^{{}}", self.reference)
    }

    pub fn subdir(&self) -> Option<&str> {
        self.subdir.as_deref()
    }
}
