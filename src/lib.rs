//! portal-inbox-sync: message synchronization and read-state reconciliation
//!
//! This crate backs an inbox widget: it fetches message records from one of
//! two interchangeable sources, normalizes them into a canonical shape,
//! reconciles per-message read state between a server-authoritative flag and
//! a client-persisted fallback timestamp, persists state changes back, and
//! composes outgoing replies with reversed sender/recipient roles.
//!
//! # Architecture
//!
//! - [`config`]: Caller-supplied, validated-at-construction configuration
//! - [`errors`]: Application error model (`AppError`/`AppResult`)
//! - [`environment`]: Local/hosted execution-context classification
//! - [`models`]: Canonical message entity and operation result types
//! - [`mapper`]: Raw record translation with required-field contracts
//! - [`source`]: Snapshot-file and tabular-API data source strategies
//! - [`read_state`]: Persisted `lastCheckedAt` fallback behind a key-value trait
//! - [`composer`]: Reply payload construction with reversed party roles
//! - [`session`]: The inbox context object tying the load cycle together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use portal_inbox_sync::config::{ApiConfig, InboxConfig, OperationConfig, OperationSet, RelationshipConfig};
//! use portal_inbox_sync::environment::Environment;
//! use portal_inbox_sync::read_state::MemoryReadStateStore;
//! use portal_inbox_sync::session::InboxSession;
//! use portal_inbox_sync::source::{StaticTokenProvider, select_source};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(InboxConfig::new(
//!     "adx",
//!     RelationshipConfig {
//!         entity_name: "adx_portalcomment".into(),
//!         collection_name: "adx_portalcomments".into(),
//!         navigation_property: "regardingobjectid_incident_adx_portalcomment".into(),
//!         regarding_collection: "incidents".into(),
//!         parties_property: "adx_portalcomment_activity_parties".into(),
//!         contact_collection: "contacts".into(),
//!         staff_collection: "systemusers".into(),
//!     },
//!     OperationSet {
//!         read: OperationConfig::enabled(),
//!         update: OperationConfig::enabled(),
//!         create: OperationConfig::enabled(),
//!         ..Default::default()
//!     },
//!     Some(ApiConfig { base_url: "https://org.example.com/api/data/v9.2".into() }),
//! )?);
//!
//! let environment = Environment::classify("https://portal.example.com");
//! let tokens = Arc::new(StaticTokenProvider::new("csrf-token"));
//! let source = select_source(environment, &config, tokens, "data/messages.json", false)?;
//!
//! let inbox = InboxSession::new(config, source, Box::new(MemoryReadStateStore::new()));
//! inbox.load_messages().await?;
//! println!("{} unread", inbox.unread_count());
//! # Ok(())
//! # }
//! ```

pub mod composer;
pub mod config;
pub mod environment;
pub mod errors;
pub mod mapper;
pub mod models;
pub mod read_state;
pub mod session;
pub mod source;

pub use config::InboxConfig;
pub use environment::Environment;
pub use errors::{AppError, AppResult};
pub use models::{LoadOutcome, Message, ReplyOutcome};
pub use session::{InboxSession, ViewMode};
pub use source::{MessageSource, TokenProvider, select_source};
