pub mod client;
pub mod error;
pub(crate) mod retry;

pub use client::CouponClient;
pub use error::ClientError;
