//! # Corpus Harness
//!
//! Ingestion and retrieval for author-attributed text corpora that back
//! retrieval-augmented generation.
//!
//! Each configured author owns a folder of plain-text works. Files are
//! checked for duplicates and for signs of belonging to a different
//! author, split into overlapping passages, embedded through a remote
//! provider, and stored with author metadata. Queries are embedded the
//! same way and answered by filtered nearest-neighbour search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────────┐   ┌──────────┐
//! │ Author dirs  │──▶│ Dedup → Contamination  │──▶│  SQLite  │
//! │ data/<name>/ │   │ → Chunk → Embed        │   │ + vectors│
//! └──────────────┘   └───────────┬────────────┘   └────┬─────┘
//!                                │                     │
//!                                ▼                     ▼
//!                     ┌────────────────────┐    ┌────────────┐
//!                     │ embedding_log_*.txt│    │  search    │
//!                     └────────────────────┘    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! corpus init                        # create database
//! corpus authors                     # list configured authors
//! corpus ingest plato                # ingest one author folder
//! corpus ingest all                  # ingest every configured author
//! corpus verify plato                # check what was stored
//! corpus search "what is justice" --author Plato
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and identifiers |
//! | [`sources`] | Author folder scanning |
//! | [`chunk`] | Overlapping passage chunking |
//! | [`contamination`] | Wrong-author detection |
//! | [`dedup`] | Already-ingested and duplicate-content checks |
//! | [`embedding`] | Provider abstraction with retry and backoff |
//! | [`rate_limit`] | Request pacing for the embedding provider |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`ingest`] | Per-file ingestion pipeline |
//! | [`ingest_log`] | Append-only ingestion audit log |
//! | [`search`] | Filtered semantic retrieval |
//! | [`verify`] | Post-ingestion verification |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod contamination;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod ingest;
pub mod ingest_log;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod search;
pub mod sources;
pub mod store;
pub mod verify;
