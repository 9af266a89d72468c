#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Session and transport core for the deployment server REST API.
//!
//! Layout:
//! - `link.rs`: link templates, query merging, and URI resolution against the server base
//! - `transport.rs`: headers, verb tunneling, and server error translation
//! - `session.rs`: root document negotiation and typed CRUD
//! - `watcher.rs`: deployment task polling until completion or deadline
//! - `version.rs`: API schema version parsing and range checks
//! - `model.rs`: resource capability trait, root document, and task payloads
//! - `codec.rs`: pluggable payload codecs (JSON by default)
//! - `config.rs` / `error.rs`: configuration and the error taxonomy

pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod model;
pub mod session;
pub mod transport;
pub mod version;
pub mod watcher;

pub use codec::{Codec, JsonCodec};
pub use config::{ClientConfig, NetworkCredentials};
pub use error::{ClientError, ClientResult, ErrorKind, TaskList};
pub use link::{LinkResolver, QueryString, expand_link};
pub use model::{Links, Resource, ResourceCollection, RootDocument, TaskReference, TaskResource, TaskState};
pub use session::{Session, SessionStatus};
pub use transport::{Operation, Transport};
pub use version::{ApiVersion, VersionRange};
pub use watcher::{DeploymentWatcher, TaskStatusSource, WatchReport, WatchVerdict};
