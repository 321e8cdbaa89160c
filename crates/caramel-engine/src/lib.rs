//! Coupon-application engine.
//!
//! Detects a supported checkout page, tries candidate codes against it one at
//! a time, measures the price effect of each, and leaves the page with the
//! best code applied. The host page is reached only through [`CheckoutPage`].

pub mod campaign;
pub mod checkout;
pub mod config;
pub mod error;
pub mod intercept;
pub mod page;
pub mod price;
pub mod registry;
pub mod sim;
pub mod timing;
pub mod trial;
pub mod wait;

pub use campaign::{
    BestOffer, CampaignObserver, CampaignReport, CampaignRunner, CouponSource, SilentObserver,
    StaticCoupons, TrialRecord,
};
pub use checkout::{detect_checkout, is_checkout};
pub use config::EngineConfig;
pub use error::{EngineError, PageError, WaitError};
pub use intercept::{Interception, NetworkInterceptor};
pub use page::{resolve_element, CheckoutPage};
pub use price::{extract_price, parse_prices, PriceMode};
pub use registry::{find_site, FileSiteSource, SiteRegistry, SiteSource, StaticSites};
pub use sim::{SimCheckoutBuilder, SimHandle, SimulatedCheckout};
pub use timing::{AdaptiveTiming, Calibration, DomainPerformance, LatencyModel, Pace};
pub use trial::CouponEngine;
pub use wait::WaitOutcome;
