//! Build artifact reader.
//!
//! Reads the JSON artifacts a contract build emits, one file per contract
//! named `<ContractName>.json` anywhere below the artifact directory. Each
//! carries the contract's JSON ABI and its creation bytecode:
//!
//! ```json
//! { "contractName": "PoolCore", "abi": [ ... ], "bytecode": "0x6080..." }
//! ```
//!
//! Debug sidecars (`*.dbg.json`) are ignored. The directory is walked in
//! file-name order; symlinks are followed and loops skipped. A name found in
//! more than one file cannot be loaded.

use cutwright_core::{Interface, ModuleKind, StandIn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors reading artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifacts under {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk artifacts under {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(
        "artifact `{name}` is ambiguous: {} and {}",
        .first.display(),
        .second.display()
    )]
    Ambiguous {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("invalid artifact {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact `{name}` has invalid bytecode: {reason}")]
    Bytecode { name: String, reason: String },
}

/// One compiled contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub contract_name: Option<String>,
    pub abi: Interface,
    #[serde(default)]
    pub bytecode: String,
}

impl Artifact {
    /// Decoded creation bytecode.
    pub fn creation_code(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        let digits = self.bytecode.strip_prefix("0x").unwrap_or(&self.bytecode);
        if digits.is_empty() {
            return Err(ArtifactError::Bytecode {
                name: name.to_string(),
                reason: "empty (abstract contract or interface?)".into(),
            });
        }
        hex::decode(digits).map_err(|e| ArtifactError::Bytecode {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Artifacts of one build, indexed by contract name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    files: BTreeMap<String, Vec<PathBuf>>,
    names: BTreeMap<String, String>,
}

impl ArtifactStore {
    /// Index every artifact below `root`.
    pub fn open(root: &Path) -> Result<Self, ArtifactError> {
        let files = index(root)?;
        debug!(root = %root.display(), artifacts = files.len(), "indexed build artifacts");
        Ok(Self {
            files,
            names: BTreeMap::new(),
        })
    }

    /// Use `overrides` (default artifact name -> actual name) for lookups.
    #[must_use]
    pub fn with_names(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.names = overrides;
        self
    }

    fn resolve_name<'a>(&'a self, default: &'a str) -> &'a str {
        self.names.get(default).map_or(default, String::as_str)
    }

    /// Load the artifact with the given default name, honoring overrides.
    pub fn load(&self, default_name: &str) -> Result<Option<Artifact>, ArtifactError> {
        let name = self.resolve_name(default_name);
        let path = match self.files.get(name).map(Vec::as_slice) {
            None | Some([]) => return Ok(None),
            Some([path]) => path,
            Some([first, second, ..]) => {
                return Err(ArtifactError::Ambiguous {
                    name: name.to_string(),
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })
    }

    /// Artifact of a module.
    pub fn module(&self, kind: ModuleKind) -> Result<Option<Artifact>, ArtifactError> {
        self.load(kind.artifact_name())
    }

    /// Artifact of a stand-in.
    pub fn stand_in(&self, stand_in: StandIn) -> Result<Option<Artifact>, ArtifactError> {
        self.load(stand_in.artifact_name())
    }

    /// Interfaces of every module the build produced.
    pub fn interfaces(&self) -> Result<BTreeMap<ModuleKind, Interface>, ArtifactError> {
        let mut out = BTreeMap::new();
        for kind in ModuleKind::ALL {
            if let Some(artifact) = self.module(kind)? {
                out.insert(kind, artifact.abi);
            }
        }
        Ok(out)
    }
}

fn index(root: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, ArtifactError> {
    let mut files: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.loop_ancestor().is_some() => {
                warn!(path = ?err.path(), "skipping symlink loop");
                continue;
            }
            Err(source) => {
                let path = source.path().unwrap_or(root).to_path_buf();
                return Err(ArtifactError::Walk { path, source });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if file_name.ends_with(".dbg.json") {
            continue;
        }
        if let Some(stem) = file_name.strip_suffix(".json") {
            let paths = files.entry(stem.to_string()).or_default();
            if let Some(first) = paths.first() {
                warn!(
                    name = stem,
                    first = %first.display(),
                    other = %entry.path().display(),
                    "duplicate artifact name"
                );
            }
            paths.push(entry.into_path());
        }
    }
    Ok(files)
}
