//! Blocking HTTP client for the Mochow vector database.
//!
//! Every call is a `POST {endpoint}/v1/{resource}?{action}` with a JSON body
//! and a bearer credential built from the account name and API key. Responses
//! carry a `{code, msg}` envelope; a non-zero `code` is surfaced as
//! [`ClientError::Server`].
//!
//! ```no_run
//! use mochow_client::{ClientConfig, MochowClient};
//!
//! let mut client = MochowClient::new(ClientConfig::new("http://127.0.0.1:8287", "root", "key"));
//! client.connect();
//! for db in client.list_databases()? {
//!     println!("{db}");
//! }
//! # Ok::<(), mochow_client::ClientError>(())
//! ```

mod client;
pub mod config;
pub mod error;
pub mod model;

pub use client::MochowClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
