//! # restcore - runtime core for generated REST API clients
//!
//! restcore is the part of a generated API client that is not generated: it
//! turns a service method's request description into HTTP calls with
//! retries and redirects, decodes whatever comes back by `Content-Type`, and
//! coerces the decoded JSON into the declared response shape, resolving
//! untagged unions by best structural fit.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restcore::coerce::{FieldShape, Model, Shape, StructShape};
//! use restcore::metadata::RequestMetadata;
//! use restcore::Client;
//! use http::Method;
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct CreateStore {
//!     name: String,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Store {
//!     id: String,
//!     name: String,
//! }
//!
//! const CREATE_STORE: StructShape =
//!     StructShape::new("CreateStore", &[FieldShape::required("name", Shape::String)]);
//! const STORE: StructShape = StructShape::new(
//!     "Store",
//!     &[
//!         FieldShape::required("id", Shape::String),
//!         FieldShape::required("name", Shape::String),
//!     ],
//! );
//!
//! impl Model for CreateStore {
//!     const SHAPE: Shape = Shape::Struct(&CREATE_STORE);
//! }
//! impl Model for Store {
//!     const SHAPE: Shape = Shape::Struct(&STORE);
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restcore::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com/v1/")?
//!         .auth_header("Authorization", "Bearer sk-test")?
//!         .timeout(Duration::from_secs(30))
//!         .max_retries(3)
//!         .build()?;
//!
//!     let created = client
//!         .post::<_, Store>("stores", &CreateStore { name: "docs".to_string() })
//!         .await?;
//!     println!("Created {} after {} attempts", created.data.id, created.attempts);
//!
//!     let metadata = RequestMetadata::new(Method::GET, "stores").with_query_param("limit", 10);
//!     let stores = client.request_value(metadata, &Shape::Mixed).await?;
//!     println!("{}", stores.data);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use restcore::{Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get::<serde_json::Value>("stores").await {
//!     Ok(response) => println!("Success: {}", response.data),
//!     Err(Error::Status { status, body, .. }) => eprintln!("HTTP error {}: {}", status, body),
//!     Err(Error::Validation(e)) => eprintln!("Unexpected payload: {}", e),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! Calls are retried on connection failures and on `408`, `409`, `429` and
//! `5xx` responses, up to `max_retries` times. `Retry-After` is honoured;
//! otherwise the delay grows quadratically with jitter. See [`retry`].

pub mod body;
mod client;
pub mod coerce;
pub mod content_type;
pub mod decode;
pub mod dump;
mod error;
pub mod metadata;
pub mod multipart;
pub mod options;
pub mod path;
pub mod request;
mod response;
pub mod retry;
pub mod sse;
pub mod stream;
pub mod transport;

pub use client::{Client, ClientBuilder, ItemStream};
pub use coerce::{Model, Shape};
pub use decode::Decoded;
pub use error::{Error, Result, ValidationError};
pub use response::{Page, Response};
pub use transport::Transport;
