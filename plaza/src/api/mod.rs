mod client;
mod error;
mod events;
mod social;

pub use client::{ApiClient, DEFAULT_API_URL};
pub use error::{ApiError, ApiResult};
pub use events::{ClientEvents, LogEvents};
pub use social::SocialApi;
