//! Resilient ad-platform API client: rate-limited, breaker-guarded, token-refreshing access to
//! the Meta Marketing API and the Google Ads API in one crate built for production.
//!
//! An [`AdPlatformClient`](client::AdPlatformClient) is constructed once per process and
//! handed to callers by handle. Each call flows through the request builders, then the executor
//! (circuit breaker, rate limiter, token manager, transport), then response classification, and
//! finally the pagination engine when the platform pages its results.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod mapping;
pub mod oauth;
pub mod obs;
pub mod platform;
pub mod request;
pub mod resilience;
pub mod store;
pub mod token;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Date, Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use client::{AdPlatformClient, CallOptions, ClientBuilder, PageStream, Urgency};
pub use error::{Error, ErrorKind, Result};
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
