//! Core modules for Helios

pub mod error;
pub mod compiler;
pub mod router;
pub mod gateway;
pub mod registry;
pub mod store;
pub mod echo;
pub mod config;
pub mod api;

pub use error::{ApiError, GatewayError, RegistryError, StoreError};
pub use compiler::{BeliefCompiler, FIRST_CONVERSATION};
pub use router::{describe_environment, NpcRouter, RouterFallback};
pub use gateway::{GatewayClient, GatewayConfig, FALLBACK_RESPONSES, LOCAL_MODE_PREFIX};
pub use registry::NpcRegistry;
pub use store::{spawn_append, InteractionStore, MemoryStore, RestStore};
pub use echo::{AttributionSource, DissonanceVerdict, EchoOutcome};
pub use config::Config;
pub use api::{create_router, run_server, AppState};
