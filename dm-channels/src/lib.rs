//! Messaging-platform transport for dmpilot.
//!
//! The `DmChannel` trait is the seam between the reply pipeline and the
//! platform's send API; `InstagramGraphApi` is the production
//! implementation. Inbound webhook parsing lives with the HTTP routes in
//! the application crate — this crate only covers the outbound direction
//! and profile lookup.

mod error;
mod instagram;
mod traits;
mod types;

pub use error::{ChannelError, Result};
pub use instagram::InstagramGraphApi;
pub use traits::DmChannel;
pub use types::{SenderAction, UserProfile};
