//! # DSA Mirror
//!
//! Mirrors a folder of solved-problem files in a GitHub repository into
//! SQLite and derives activity analytics (daily activity, per-topic counts,
//! streak, calendar heatmap) from that mirror alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────┐
//! │  GitHub API │──▶│ Sync engine │──▶│  SQLite   │
//! │ tree/commits│   │ full / incr │   │  mirror   │
//! └─────────────┘   └─────────────┘   └─────┬─────┘
//!        ▲                                  │
//!        │ webhook                          ▼
//!   ┌────┴─────┐                     ┌─────────────┐
//!   │   HTTP   │◀────────────────────│ Stats reader│
//!   └──────────┘                     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dsa init                # create database
//! dsa check               # verify token and repository
//! dsa sync                # full sync first time, incremental afterwards
//! dsa stats               # print dashboard
//! dsa serve               # start HTTP server with webhook endpoint
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Row types, wire-neutral repository types, sync reports |
//! | [`metadata`] | Header annotation parsing |
//! | [`repo_client`] | Repository client trait and error kinds |
//! | [`github`] | GitHub REST client |
//! | [`cache`] | TTL response cache |
//! | [`store`] | Row-level upsert and query helpers |
//! | [`sync`] | Full and incremental sync |
//! | [`stats`] | Dashboard statistics |
//! | [`webhook`] | Push signature verification and filtering |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod db;
pub mod github;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod repo_client;
pub mod server;
pub mod stats;
pub mod store;
pub mod sync;
pub mod webhook;
