//! noteboard-core: tiered persistence for a shared note board
//!
//! Notes are stored through [`PersistenceGateway`], which tries, in order:
//!
//! ```text
//! request → RemoteDocumentClient (if configured)
//!         → DatabaseTier (pooled Postgres via ConnectionCache)
//!         → FallbackStore (in-process, lost on restart)
//! ```
//!
//! The first tier that completes wins; failures fall through and are
//! logged. Routing, rendering and the board UI live outside this crate and
//! only call [`PersistenceGateway::list`], [`PersistenceGateway::create`],
//! [`PersistenceGateway::update_position`] and
//! [`PersistenceGateway::debug_status`].

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod remote;
pub mod tier;

pub use config::{GatewayConfig, RemoteConfig};
pub use error::{ConnectionError, GatewayError, GatewayResult, TierError, TierResult};
pub use gateway::{CreateOutcome, DebugStatus, PersistenceGateway, UpdateOutcome};
pub use memory::FallbackStore;
pub use model::{Note, NoteDraft, NoteId, NoteKind, ValidationError};
pub use remote::RemoteDocumentClient;
pub use tier::{DurableTier, TierKind, UpdateStatus};
