//! Hookpool Engine
//!
//! This crate keeps a pool of webhooks alive across a community and drives
//! traffic through them:
//! - DiscordService: REST client for channels, webhooks and deliveries
//! - EndpointRegistry: Concurrent map of known webhooks keyed by address
//! - Provisioner: Discovers webhooks and tops up every text channel in
//!   rate-limited bursts
//! - DispatchLoop: Per-webhook send cycle with pacing and 429 handling
//! - LoopSupervisor: Starts each loop exactly once and stops them on shutdown
//! - Reconciler: Periodic driver tying provisioning and loop launches together
//! - FileSink: Atomic persistence of the active address list

pub mod error;
pub mod client;
pub mod messages;
pub mod registry;
pub mod persistence;
pub mod engine_metrics;
pub mod provisioner;
pub mod dispatch;
pub mod supervisor;
pub mod reconciler;
pub mod engine;

pub use error::{EngineError, ServiceError};
pub use client::{DiscordService, DiscordServiceConfig, Identity, MessagingService, ServiceResult};
pub use messages::{MessagePool, FALLBACK_MESSAGE};
pub use registry::{EndpointRegistry, Upsert};
pub use persistence::{persist, AddressSink, FileSink};
pub use provisioner::{BurstPlan, ChannelDeficit, PassReport, Provisioner, ProvisionerConfig};
pub use dispatch::{DispatchContext, DispatchLoop, LoopExit, LoopState, Pacing};
pub use supervisor::LoopSupervisor;
pub use reconciler::{Reconciler, ReconcilerConfig, TickSummary};
pub use engine::{Engine, EngineConfig};
