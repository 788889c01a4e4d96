//!# Synology webapi client
//!
//! A Rust client library for the Synology webapi (`FileStation`, Synology Drive
//! and Team Folders, or any other `SYNO.*` service). It takes care of the
//! plumbing every call shares, so endpoint methods boil down to a service,
//! an API name, a path and parameters.
//!
//! ## Features
//!
//! - Login/logout with session ID management and scoped sessions
//! - Generic request dispatch with the session ID, API identifier, version and method injected
//! - Query string (GET), form (POST) and multipart (upload) encoding
//! - Response envelope decoding with the common error codes translated
//! - Raw bodies for downloads and other non-JSON replies
//! - Configurable connect/request timeouts and TLS verification
//! - Debug tracing of URLs, status codes and error bodies through the `log` facade
//!
//! ## Usage example
//!
//! ```rust,no_run
//! use anyhow::Result;
//! use std::env;
//! use syno_webapi::client::SynoClientBuilder;
//! use syno_webapi::entities::ApiRequest;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let mut client = SynoClientBuilder::from_env()?
//!         .service_name("FileStation")
//!         .build()?;
//!
//!     let username = env::var("SYNOLOGY_USERNAME")?;
//!     let password = env::var("SYNOLOGY_PASSWORD")?;
//!     client.connect(&username, &password, None).await?;
//!
//!     let shares = client
//!         .request(
//!             ApiRequest::new("FileStation", "List", "entry.cgi", "list_share")
//!                 .version(2)
//!                 .params([("limit", "25"), ("offset", "0")]),
//!         )
//!         .await?;
//!     println!("shares: {:?}", shares.data());
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod entities;
pub mod utils;
pub mod wire;
