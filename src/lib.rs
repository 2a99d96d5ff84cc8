/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Reconcile release artifact metadata across the local build
    directory, the XML appcast and the JSON release catalog.

  Security / Safety Notes:
    Cryptography is delegated to external tools; catalog
    writes require explicit repair mode and credentials.

  Dependencies:
    See individual modules.

  Operational Scope:
    Library surface used by the `sparkler` binary and tests.

  Revision History:
    2026-10-16 COD  Established Sparkler core library.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
============================================================*/

pub mod appcast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logger;
pub mod model;
pub mod reconcile;
pub mod scanner;
pub mod signature;

pub use error::{Result, SparklerError};
