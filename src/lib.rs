//! Client for the SuprSend notification API.
//!
//! Single calls (`trigger_workflow`, `track_event`, `save_user_edit`) send one
//! signed request. Bulk coordinators accept any number of records, pack them
//! into provider sized chunks and merge the per-chunk outcomes into one
//! [`BulkResponse`](bulk::BulkResponse).
//!
//! ```rust,ignore
//! use suprsend_client::{Client, Event};
//!
//! let client = Client::from_env()?;
//! let mut bulk = client.bulk_events();
//! bulk.append((0..250).map(|i| Event::new(format!("user-{i}"), "signup")));
//! let response = bulk.trigger().await;
//! println!("{response}");
//! ```

pub mod attachment;
pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod records;
pub mod schema;
pub mod signature;
pub mod transport;

pub use attachment::Attachment;
pub use bulk::{BulkCoordinator, BulkResponse, BulkStatus, FailedRecord};
pub use client::{ApiResponse, Client};
pub use config::{BulkLimits, ClientConfig};
pub use error::{RecordError, Result, SuprsendError};
pub use records::{Event, IdentityOp, UserEdit, WorkflowTrigger};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportError};

use env_logger::Env;
use std::sync::Once;

pub const SDK_VERSION: &str = concat!("suprsend-rust/", env!("CARGO_PKG_VERSION"));

static LOGGER: Once = Once::new();

/// Install `env_logger` once; `RUST_LOG` overrides the `info` default.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    });
}
