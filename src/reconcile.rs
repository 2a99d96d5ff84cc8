/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::reconcile
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Reconcile local release artifacts against the appcast or
    the catalog, classify every discrepancy, and optionally
    write corrected sizes back to the catalog.

  Security / Safety Notes:
    Catalog writes happen only in explicit repair mode and
    only when a compared value actually differs.

  Dependencies:
    serde for the JSON report, chrono for timestamps.

  Operational Scope:
    Drives the verify-feed and verify-catalog subcommands.

  Revision History:
    2026-10-16 COD  Authored reconciliation engine.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Per-item problems are reported, setup problems abort
    - Strictly sequential processing in declaration order
    - Rich report for audit and observability
============================================================*/

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::catalog::VersionCatalog;
use crate::error::{Result, SparklerError};
use crate::logger::Logger;
use crate::model::{Delta, Version};
use crate::scanner::LocalScan;
use crate::signature::{require_public_key, SignatureProvider};

/// Outcome of comparing one local fact against its remote declaration.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Ok,
    SizeMismatch,
    SignatureMismatch,
    MissingLocal,
    MissingRemoteMatch,
    /// The file exists but could not be checked.
    CheckFailed,
}

/// What a finding is about.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Version,
    Delta,
}

/// Result of a catalog write-back attempt.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepairOutcome {
    Repaired,
    Failed,
}

/// Whether mismatches are only reported or also written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    ReportOnly,
    Repair,
}

/// Which reconciliation produced a report.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Flow {
    VerifyFeed,
    VerifyCatalog,
}

/// One classified check.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Finding {
    pub subject: Subject,
    pub identifier: String,
    pub path: Option<PathBuf>,
    pub classification: Classification,
    pub detail: Option<String>,
    pub repair: Option<RepairOutcome>,
}

impl Finding {
    fn new(
        subject: Subject,
        identifier: String,
        path: Option<PathBuf>,
        classification: Classification,
    ) -> Self {
        Self {
            subject,
            identifier,
            path,
            classification,
            detail: None,
            repair: None,
        }
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    /// A mismatch that is still outstanding after this run.
    fn is_unresolved(&self) -> bool {
        match self.classification {
            Classification::SizeMismatch | Classification::SignatureMismatch => {
                self.repair != Some(RepairOutcome::Repaired)
            }
            Classification::MissingLocal | Classification::CheckFailed => true,
            Classification::Ok | Classification::MissingRemoteMatch => false,
        }
    }
}

/// Metadata block describing report context.
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub generated_by: String,
    pub flow: Flow,
    pub source: String,
    pub ok: usize,
    pub size_mismatches: usize,
    pub signature_mismatches: usize,
    pub missing_local: usize,
    pub missing_remote_match: usize,
    pub check_failures: usize,
    pub repaired: usize,
    pub repair_failures: usize,
}

/// Wrapper representing the full reconciliation report.
#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub metadata: ReportMetadata,
    pub findings: Vec<Finding>,
}

impl ReconciliationReport {
    fn new(flow: Flow, source: &str, findings: Vec<Finding>) -> Self {
        let count = |classification: Classification| {
            findings
                .iter()
                .filter(|finding| finding.classification == classification)
                .count()
        };
        let repairs = |outcome: RepairOutcome| {
            findings
                .iter()
                .filter(|finding| finding.repair == Some(outcome))
                .count()
        };

        let metadata = ReportMetadata {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            generated_by: "sparkler_core".to_string(),
            flow,
            source: source.to_string(),
            ok: count(Classification::Ok),
            size_mismatches: count(Classification::SizeMismatch),
            signature_mismatches: count(Classification::SignatureMismatch),
            missing_local: count(Classification::MissingLocal),
            missing_remote_match: count(Classification::MissingRemoteMatch),
            check_failures: count(Classification::CheckFailed),
            repaired: repairs(RepairOutcome::Repaired),
            repair_failures: repairs(RepairOutcome::Failed),
        };

        Self { metadata, findings }
    }

    pub fn findings_of(&self, classification: Classification) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |finding| finding.classification == classification)
    }

    /// Turn the findings into a run verdict.
    ///
    /// A missing local artifact surfaces as `MissingLocalArtifact`, naming a
    /// missing version before a missing delta; any other unresolved
    /// mismatch, failed check or failed repair as `Discrepancies`.
    pub fn verdict(&self) -> Result<()> {
        let missing = self
            .findings_of(Classification::MissingLocal)
            .find(|finding| finding.subject == Subject::Version)
            .or_else(|| self.findings_of(Classification::MissingLocal).next());
        if let Some(missing) = missing {
            return Err(SparklerError::MissingLocalArtifact {
                version: missing.identifier.clone(),
                path: missing.path.clone().unwrap_or_default(),
            });
        }
        let count = self
            .findings
            .iter()
            .filter(|finding| finding.is_unresolved())
            .count();
        if count > 0 {
            return Err(SparklerError::Discrepancies { count });
        }
        Ok(())
    }
}

/// Cross-source reconciliation over one signature provider.
pub struct Reconciler<'a, S: SignatureProvider + ?Sized> {
    signer: &'a S,
    logger: &'a Logger,
}

impl<'a, S: SignatureProvider + ?Sized> Reconciler<'a, S> {
    pub fn new(signer: &'a S, logger: &'a Logger) -> Self {
        Self { signer, logger }
    }

    /// Check each appcast version (and its deltas) against the working directory.
    pub async fn verify_against_feed(
        &self,
        feed_url: &str,
        versions: &[Version],
        working_dir: &Path,
        public_key: Option<&Path>,
    ) -> Result<ReconciliationReport> {
        let public_key = require_public_key(public_key)?;
        let mut findings = Vec::new();

        for version in versions {
            let path = working_dir.join(version.artifact_file_name());
            if !path.exists() {
                self.logger.error(
                    "MISSING",
                    format!(
                        "Version {} has no local artifact at {}",
                        version.version,
                        path.display()
                    ),
                );
                findings.push(Finding::new(
                    Subject::Version,
                    version.version.clone(),
                    Some(path),
                    Classification::MissingLocal,
                ));
                if !version.deltas.is_empty() {
                    self.logger.warn(
                        "MISSING",
                        format!(
                            "Skipping {} deltas of {}",
                            version.deltas.len(),
                            version.version
                        ),
                    );
                }
                continue;
            }

            let checks = self
                .check_artifact(
                    Subject::Version,
                    &version.version,
                    &path,
                    &version.signature,
                    version.length,
                    public_key,
                )
                .await?;
            findings.extend(checks);

            for delta in &version.deltas {
                findings.extend(self.check_delta(delta, working_dir, public_key).await?);
            }
        }

        let report = ReconciliationReport::new(Flow::VerifyFeed, feed_url, findings);
        self.logger.info(
            "SUMMARY",
            format!(
                "feed versions={} ok={} size={} signature={} missing={} failed={}",
                versions.len(),
                report.metadata.ok,
                report.metadata.size_mismatches,
                report.metadata.signature_mismatches,
                report.metadata.missing_local,
                report.metadata.check_failures
            ),
        );
        Ok(report)
    }

    async fn check_delta(
        &self,
        delta: &Delta,
        working_dir: &Path,
        public_key: &Path,
    ) -> Result<Vec<Finding>> {
        let identifier = delta.identifier();
        let path = working_dir.join(delta.file_name());
        if !path.exists() {
            self.logger.error(
                "MISSING",
                format!("Delta {identifier} has no local file at {}", path.display()),
            );
            return Ok(vec![Finding::new(
                Subject::Delta,
                identifier,
                Some(path),
                Classification::MissingLocal,
            )]);
        }
        self.check_artifact(
            Subject::Delta,
            &identifier,
            &path,
            &delta.signature,
            delta.length,
            public_key,
        )
        .await
    }

    /// Signature and size checks for one on-disk file.
    ///
    /// Only setup failures propagate; anything else that stops this one
    /// file from being checked becomes a `CheckFailed` finding.
    async fn check_artifact(
        &self,
        subject: Subject,
        identifier: &str,
        path: &Path,
        signature: &str,
        declared_length: u64,
        public_key: &Path,
    ) -> Result<Vec<Finding>> {
        let checked = self
            .inspect_artifact(subject, identifier, path, signature, declared_length, public_key)
            .await;
        match checked {
            Err(err) if !err.is_setup_failure() => {
                self.logger
                    .error("CHECK", format!("Could not check {identifier}: {err}"));
                Ok(vec![Finding::new(
                    subject,
                    identifier.to_string(),
                    Some(path.to_path_buf()),
                    Classification::CheckFailed,
                )
                .with_detail(err.to_string())])
            }
            other => other,
        }
    }

    async fn inspect_artifact(
        &self,
        subject: Subject,
        identifier: &str,
        path: &Path,
        signature: &str,
        declared_length: u64,
        public_key: &Path,
    ) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        if !self.signer.verify(path, signature, Some(public_key)).await? {
            self.logger.error(
                "SIGNATURE",
                format!("Signature of {identifier} does not verify ({})", path.display()),
            );
            findings.push(
                Finding::new(
                    subject,
                    identifier.to_string(),
                    Some(path.to_path_buf()),
                    Classification::SignatureMismatch,
                )
                .with_detail("declared signature does not verify against the public key".into()),
            );
        }

        let actual_length = tokio::fs::metadata(path)
            .await
            .map_err(|err| {
                SparklerError::Filesystem(format!("Failed to stat {}: {err}", path.display()))
            })?
            .len();
        if actual_length != declared_length {
            self.logger.error(
                "SIZE",
                format!(
                    "Size of {identifier} differs: declared {declared_length}, \
                     on disk {actual_length} ({})",
                    path.display()
                ),
            );
            findings.push(
                Finding::new(
                    subject,
                    identifier.to_string(),
                    Some(path.to_path_buf()),
                    Classification::SizeMismatch,
                )
                .with_detail(format!("declared {declared_length}, on disk {actual_length}")),
            );
        }

        if findings.is_empty() {
            self.logger.debug("OK", format!("{identifier} verified"));
            findings.push(Finding::new(
                subject,
                identifier.to_string(),
                Some(path.to_path_buf()),
                Classification::Ok,
            ));
        }
        Ok(findings)
    }

    /// Compare scanned local artifacts with catalog records by version id.
    ///
    /// The first catalog record with an equal id is the match. Local
    /// versions without a match are skipped. In repair mode a size
    /// mismatch overwrites the catalog length with the local one.
    pub async fn verify_against_catalog<C: VersionCatalog + ?Sized>(
        &self,
        catalog: &C,
        catalog_label: &str,
        working_dir: &Path,
        private_key: &Path,
        mode: RepairMode,
    ) -> Result<ReconciliationReport> {
        let remote_versions = catalog.list_versions().await?;
        self.logger.info(
            "CATALOG",
            format!("Catalog lists {} versions", remote_versions.len()),
        );

        let mut scan = LocalScan::open(working_dir, private_key, self.signer).await?;
        let mut findings = Vec::new();
        let mut local_count = 0usize;

        while let Some(local) = scan.next().await? {
            local_count += 1;
            let local_path = local.local_path().map(Path::to_path_buf);

            let Some(remote) = remote_versions
                .iter()
                .find(|remote| remote.version == local.version)
            else {
                self.logger.info(
                    "SKIP",
                    format!("Version {} is not in the catalog yet", local.version),
                );
                findings.push(Finding::new(
                    Subject::Version,
                    local.version.clone(),
                    local_path,
                    Classification::MissingRemoteMatch,
                ));
                continue;
            };

            if remote.length == local.length {
                self.logger
                    .debug("OK", format!("{} length {} matches", local.version, local.length));
                findings.push(Finding::new(
                    Subject::Version,
                    local.version.clone(),
                    local_path,
                    Classification::Ok,
                ));
                continue;
            }

            self.logger.warn(
                "SIZE",
                format!(
                    "Size of {} differs: catalog {}, local {}",
                    local.version, remote.length, local.length
                ),
            );
            let mut finding = Finding::new(
                Subject::Version,
                local.version.clone(),
                local_path,
                Classification::SizeMismatch,
            )
            .with_detail(format!(
                "catalog {}, local {}",
                remote.length, local.length
            ));

            if mode == RepairMode::Repair {
                let repaired = remote.reconciled_with(&local).ok_or_else(|| {
                    SparklerError::UnpublishedVersion {
                        version: remote.version.clone(),
                    }
                })?;
                let outcome = if catalog.update_version(&repaired, self.logger).await? {
                    self.logger.info(
                        "REPAIR",
                        format!("Catalog length of {} set to {}", local.version, local.length),
                    );
                    RepairOutcome::Repaired
                } else {
                    self.logger
                        .error("REPAIR", format!("Write-back for {} failed", local.version));
                    RepairOutcome::Failed
                };
                finding.repair = Some(outcome);
            }
            findings.push(finding);
        }

        let report = ReconciliationReport::new(Flow::VerifyCatalog, catalog_label, findings);
        self.logger.info(
            "SUMMARY",
            format!(
                "local versions={local_count} ok={} size={} unmatched={} repaired={} failed={}",
                report.metadata.ok,
                report.metadata.size_mismatches,
                report.metadata.missing_remote_match,
                report.metadata.repaired,
                report.metadata.repair_failures
            ),
        );
        Ok(report)
    }
}

/// Persist the report to the given path.
pub fn write_report(report: &ReconciliationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            SparklerError::Filesystem(format!(
                "Failed to create report directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|err| {
        SparklerError::Filesystem(format!(
            "Failed to create report file {}: {err}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, report).map_err(|err| {
        SparklerError::Filesystem(format!("Failed to write report {}: {err}", path.display()))
    })?;
    Ok(())
}
