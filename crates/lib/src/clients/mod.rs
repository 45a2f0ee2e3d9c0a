//! HTTP clients for the external services the dispatcher talks to.
//!
//! Each client is a thin request/response wrapper with its own error enum; none of them retry.

mod assistant;
mod leads;
mod messaging;
mod platform;

pub use assistant::{AssistantClient, AssistantError};
pub use leads::{LeadRecord, LeadsClient, LeadsError, Product};
pub use messaging::{CarouselButton, CarouselCard, MessagingClient, MessagingError};
pub use platform::{only_digits, AgentSettings, PlatformClient, PlatformError};
