/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::model
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Shared structures describing release versions and the
    binary deltas between them, as read from the working
    directory, the appcast, or the catalog.

  Security / Safety Notes:
    Pure data container; no I/O performed in this module.

  Dependencies:
    reqwest::Url for remote locations, serde for reports.

  Operational Scope:
    Used by the scanner, feed reader, catalog client and the
    reconciliation engine to pass release metadata around.

  Revision History:
    2026-10-16 COD  Introduced Version/Delta records.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Illegal location states are unrepresentable
============================================================*/

use std::path::{Path, PathBuf};

use reqwest::Url;

/// File extension of full release artifacts.
pub const ARTIFACT_EXTENSION: &str = "zip";
/// File extension of binary delta artifacts.
pub const DELTA_EXTENSION: &str = "delta";

/// Where a version record was sourced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Produced by scanning the working directory.
    Local(PathBuf),
    /// Declared by the appcast or the catalog.
    Remote(Url),
    /// A remote record that has been matched to a local artifact.
    Reconciled { local: PathBuf, remote: Url },
}

/// Canonical record of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: String,
    pub short_version: String,
    pub signature: String,
    pub length: u64,
    pub location: Location,
    pub deltas: Vec<Delta>,
}

impl Version {
    /// Build a record for an artifact found on disk.
    pub fn local(version: String, signature: String, length: u64, path: PathBuf) -> Self {
        let short_version = short_version(&version).to_string();
        Self {
            version,
            short_version,
            signature,
            length,
            location: Location::Local(path),
            deltas: Vec::new(),
        }
    }

    /// Build a record declared by a remote feed or catalog.
    pub fn remote(
        version: String,
        short_version: String,
        signature: String,
        length: u64,
        url: Url,
    ) -> Self {
        Self {
            version,
            short_version,
            signature,
            length,
            location: Location::Remote(url),
            deltas: Vec::new(),
        }
    }

    pub fn with_deltas(mut self, deltas: Vec<Delta>) -> Self {
        self.deltas = deltas;
        self
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            Location::Local(path) | Location::Reconciled { local: path, .. } => Some(path),
            Location::Remote(_) => None,
        }
    }

    pub fn remote_url(&self) -> Option<&Url> {
        match &self.location {
            Location::Remote(url) | Location::Reconciled { remote: url, .. } => Some(url),
            Location::Local(_) => None,
        }
    }

    /// Expected file name of this version's artifact in the working directory.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.version)
    }

    /// Unify this remote record with a local artifact, adopting the local length.
    ///
    /// Returns `None` when `self` carries no remote url or `local` carries no path;
    /// the signature stays the remote one since it was computed by the publisher.
    pub fn reconciled_with(&self, local: &Version) -> Option<Version> {
        let remote = self.remote_url()?.clone();
        let path = local.local_path()?.to_path_buf();
        Some(Version {
            length: local.length,
            location: Location::Reconciled {
                local: path,
                remote,
            },
            ..self.clone()
        })
    }
}

/// Record of a binary patch between two versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub from_version: String,
    pub to_version: String,
    pub url: Url,
    pub signature: String,
    pub length: u64,
    pub from_version_signature: Option<String>,
    pub to_version_signature: Option<String>,
}

impl Delta {
    /// Construct a delta, rejecting a patch from a version onto itself.
    pub fn new(
        from_version: String,
        to_version: String,
        url: Url,
        signature: String,
        length: u64,
    ) -> Option<Self> {
        if from_version == to_version {
            return None;
        }
        Some(Self {
            from_version,
            to_version,
            url,
            signature,
            length,
            from_version_signature: None,
            to_version_signature: None,
        })
    }

    pub fn identifier(&self) -> String {
        delta_identifier(&self.from_version, &self.to_version)
    }

    /// Expected file name of this delta in the working directory.
    pub fn file_name(&self) -> String {
        format!("{}.{DELTA_EXTENSION}", self.identifier())
    }
}

/// Human-facing release number: everything before the first `-`.
pub fn short_version(version: &str) -> &str {
    version
        .split_once('-')
        .map_or(version, |(prefix, _)| prefix)
}

pub fn delta_identifier(from_version: &str, to_version: &str) -> String {
    format!("{from_version}--{to_version}")
}
