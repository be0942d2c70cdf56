//! # Repository Layer
//!
//! SeaORM data access for channels, automations, inbound events and
//! interaction reports. Every repository holds a shared connection handle and
//! returns `anyhow::Result`.

pub mod automation;
pub mod channel;
pub mod event;
pub mod report;

pub use automation::AutomationRepository;
pub use channel::{ChannelCredential, ChannelRepository, ChannelSummary, NewChannel, RoutingIdInUse};
pub use event::EventRepository;
pub use report::{NewReport, Recorded, ReportFilter, ReportRepository};
