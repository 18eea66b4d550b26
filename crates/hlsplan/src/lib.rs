//! # hlsplan-engine
//!
//! Resolves HLS playlists into canonical segment plans.
//!
//! Given a manifest URL (possibly a master playlist with alternate renditions,
//! site-specific quirks and encryption), the engine produces an ordered list of
//! segment parts with byte ranges, key material references, IVs and timing,
//! written as `meta.json` into a per-job working directory.
//!
//! ## Features
//!
//! - Master playlist handling with best-variant selection
//! - External audio and subtitle track resolution
//! - AES-128 key resolution with provider-specific key transforms
//! - Advertisement removal with discontinuity repair
//! - Time and index range trimming
//!
//! ## Example
//!
//! ```no_run
//! use hlsplan_engine::{FetchConfig, ResolverConfig, Resolver};
//!
//! # async fn run() -> Result<(), hlsplan_engine::ResolveError> {
//! let config = ResolverConfig::builder("https://example.com/live/master.m3u8")
//!     .with_work_dir("./Downloads/job")
//!     .build()?;
//! let resolver = Resolver::with_fetch_config(&FetchConfig::default(), config)?;
//! let resolution = resolver.resolve().await?;
//! println!("{} segments", resolution.plan.count);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod plan;
pub mod providers;
pub mod proxy;
pub mod resolver;
pub mod url_utils;
pub mod workspace;

pub use builder::{FetchConfigBuilder, ResolverConfigBuilder};
pub use config::{FetchConfig, KeyOverride, ResolverConfig};
pub use error::ResolveError;
pub use fetch::{FetchError, HttpFetcher, UriFetcher, create_client};
pub use manifest::{MediaTrack, Part, Segment};
pub use plan::{MasterListing, Plan, RangeSpec};
pub use providers::ProviderRules;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use resolver::{Resolution, Resolver};
pub use workspace::Workspace;
