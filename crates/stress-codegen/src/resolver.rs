//! Hint-path assembly resolution.
//!
//! Test dependencies live in arbitrary directories supplied by the suite, so
//! the platform's default probing is replaced outright: a name either resolves
//! against the hint paths or comes back as [`ResolveError::NotFound`]. Whether
//! a miss is fatal is the caller's decision.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BINARY_EXTENSION: &str = "dll";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("assembly '{name}' not found in {} hint path(s)", .searched.len())]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("failed to load assembly from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }
}

/// Which candidate wins when several hint paths hold the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Scan every hint path and keep the last hit. This is what the suite
    /// tooling has always done, so it stays the default.
    #[default]
    LastMatch,
    FirstMatch,
}

/// Turns a located file into a usable handle.
pub trait AssemblyLoader {
    type Assembly;

    fn load_from_path(&self, name: &str, path: &Path) -> Result<Self::Assembly, ResolveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAssembly {
    pub name: String,
    pub path: PathBuf,
    pub image: Vec<u8>,
}

/// Reads the whole image into memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileAssemblyLoader;

impl AssemblyLoader for FileAssemblyLoader {
    type Assembly = LoadedAssembly;

    fn load_from_path(&self, name: &str, path: &Path) -> Result<LoadedAssembly, ResolveError> {
        let image = fs::read(path).map_err(|source| ResolveError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(LoadedAssembly {
            name: name.to_string(),
            path: path.to_path_buf(),
            image,
        })
    }
}

/// Outcome of resolving a batch of names.
#[derive(Debug)]
pub struct DependencySet<A> {
    pub resolved: Vec<A>,
    pub missing: Vec<String>,
}

impl<A> DependencySet<A> {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HintPathResolver<L = FileAssemblyLoader> {
    hint_paths: Vec<PathBuf>,
    extension: String,
    policy: ResolutionPolicy,
    loader: L,
}

impl HintPathResolver<FileAssemblyLoader> {
    pub fn new<I, P>(hint_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_loader(hint_paths, FileAssemblyLoader)
    }
}

impl<L: AssemblyLoader> HintPathResolver<L> {
    pub fn with_loader<I, P>(hint_paths: I, loader: L) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            hint_paths: hint_paths.into_iter().map(Into::into).collect(),
            extension: DEFAULT_BINARY_EXTENSION.to_string(),
            policy: ResolutionPolicy::default(),
            loader,
        }
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn hint_paths(&self) -> &[PathBuf] {
        &self.hint_paths
    }

    /// `<hint>/<name>.<ext>` for every hint path, in order.
    pub fn candidate_paths<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        let file_name = format!("{}.{}", name, self.extension);
        self.hint_paths.iter().map(move |h| h.join(&file_name))
    }

    /// Finds the file `name` resolves to without loading it.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let mut found = None;
        for candidate in self.candidate_paths(name) {
            if candidate.is_file() {
                tracing::debug!(assembly = name, path = %candidate.display(), "hint path match");
                found = Some(candidate);
                if self.policy == ResolutionPolicy::FirstMatch {
                    break;
                }
            }
        }
        found
    }

    pub fn resolve(&self, name: &str) -> Result<L::Assembly, ResolveError> {
        match self.locate(name) {
            Some(path) => self.loader.load_from_path(name, &path),
            None => {
                tracing::debug!(
                    assembly = name,
                    hint_paths = self.hint_paths.len(),
                    "assembly not found"
                );
                Err(ResolveError::NotFound {
                    name: name.to_string(),
                    searched: self.hint_paths.clone(),
                })
            }
        }
    }

    /// Resolves every name. Misses are collected; load failures abort.
    pub fn resolve_all<'n, I>(&self, names: I) -> Result<DependencySet<L::Assembly>, ResolveError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut set = DependencySet {
            resolved: Vec::new(),
            missing: Vec::new(),
        };
        for name in names {
            match self.resolve(name) {
                Ok(assembly) => set.resolved.push(assembly),
                Err(ResolveError::NotFound { name, .. }) => set.missing.push(name),
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }
}
