// # dyndns-core
//
// Core library for the dynamic DNS client.
//
// ## Architecture Overview
//
// - **address**: The only way to obtain a validated `Address`
// - **IpResolver**: Ordered, bounded-parallel lookup with interface fallback
// - **BackoffController**: Failure counting and retry delays
// - **DnsProvider**: Trait for pushing addresses to provider APIs
// - **ProviderRegistry**: Tag-keyed provider factories
// - **NotificationDispatcher** / **CooldownTracker**: Level-filtered,
//   rate-limited notification fan-out
// - **StateStore**: Last known addresses and cooldowns across restarts
// - **UpdateOrchestrator**: The control loop tying it together
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from transports
// 2. **Never give up**: Network failures slow the loop down, never stop it
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Unchanged addresses are not pushed again

pub mod address;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod notification;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use address::{Address, IpFamily};
pub use backoff::{BackoffController, BackoffPolicy, HealthState, NetworkHealth};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChannelConfig, Config, EngineSettings, NotifyConfig, ProviderSpec, Settings};
pub use engine::{Components, CycleReport, EngineEvent, UpdateOrchestrator};
pub use error::{Error, Result};
pub use notification::{
    ChannelDescriptor, CooldownTracker, Event, Level, NotificationDispatcher,
};
pub use registry::ProviderRegistry;
pub use resolver::{IpResolver, Resolvers};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{
    DnsProvider, FailureReason, IpSource, Notifier, StateStore, UpdateOutcome, UpdateResult,
};
