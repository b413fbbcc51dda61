//! # inter-sdk-core - authenticated transport for the Inter banking APIs
//!
//! This crate is the transport layer shared by the banking, billing and PIX
//! facades. It takes care of:
//!
//! - **Client certificates** - the PKCS#12 bundle issued by the provider is
//!   converted to PEM once, checked for expiry and handed to rustls for
//!   mutual TLS
//! - **OAuth2 tokens** - client-credentials tokens are cached per client and
//!   scope, refreshed 60 seconds before expiry, with single-flight refresh
//!   under concurrency
//! - **Typed failures** - responses become a body or one of
//!   [`Error::Client`], [`Error::Server`], [`Error::Authentication`],
//!   [`Error::Transport`], each carrying the provider's structured [`ApiError`]
//! - **Rate limiting** - optional cooldown-and-replay of 429 responses with a
//!   bounded number of attempts
//!
//! ## Quick Start
//!
//! ```no_run
//! use inter_sdk_core::{Config, Environment, Error, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = Config::builder()
//!         .environment(Environment::Production)
//!         .client_id("client-id")
//!         .client_secret("client-secret")
//!         .certificate("inter.pfx", "pfx-password")
//!         .rate_limit_control(true)
//!         .build()?;
//!
//!     let transport = Transport::new(config)?;
//!
//!     match transport.get("/banking/v2/saldo", "extrato.read").await {
//!         Ok(body) => println!("{}", body),
//!         Err(Error::Client { status, error }) => {
//!             eprintln!("{}: {}", status, error);
//!         }
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Sharing tokens
//!
//! Facades built on separate transports can reuse tokens by sharing one
//! [`TokenCache`]:
//!
//! ```no_run
//! use inter_sdk_core::{Config, TokenCache, Transport};
//! use std::sync::Arc;
//!
//! # fn example(banking: Config, pix: Config) -> Result<(), inter_sdk_core::Error> {
//! let tokens = Arc::new(TokenCache::new());
//! let banking = Transport::with_token_cache(banking, tokens.clone())?;
//! let pix = Transport::with_token_cache(pix, tokens)?;
//! # Ok(())
//! # }
//! ```

pub mod certificate;
mod config;
mod error;
pub mod metadata;
pub mod rate_limit;
mod response;
pub mod token;
mod transport;

pub use certificate::{CertificateExpiry, CertificateMaterial, MaterializedCertificate};
pub use config::{Config, ConfigBuilder, Environment};
pub use error::{ApiError, Error, Result, Violation};
pub use response::Response;
pub use token::{CachedToken, TokenCache};
pub use transport::{Transport, ACCOUNT_HEADER, SDK_HEADER, SDK_VERSION_HEADER};
