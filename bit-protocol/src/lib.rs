//! Client-side git smart transport protocol engine.
//!
//! Three layers, leaves first: pkt-line framing ([`pktline`]), advertisement and
//! capability negotiation ([`advertisement`], [`capability`], [`ls_refs`], [`refs`]),
//! and fetch orchestration ([`fetch`], [`refspec`], [`fetch_head`]). [`connection`]
//! ties the framing layer to a caller-supplied byte stream; [`traits`] names the
//! external collaborators (local ref database, connectivity checker, tracking-ref
//! updater, pack negotiator) this crate treats as opaque.
//!
//! A typical session: open a [`connection::Connection`] over some `AsyncRead +
//! AsyncWrite` transport, call [`advertisement::read`], follow up with
//! [`ls_refs::request`]/[`ls_refs::read_response`] if the peer spoke protocol v2,
//! then hand the result to [`fetch::plan`] and [`fetch::execute`].

pub mod advertisement;
pub mod capability;
pub mod config;
pub mod connection;
pub mod error;
pub mod fetch;
pub mod fetch_head;
pub mod ls_refs;
pub mod oid;
pub mod pktline;
pub mod refs;
pub mod refspec;
pub mod traits;

pub use config::{FetchOptions, PerUrlHttpConfig, TagOpt, Timeout};
pub use connection::{Connection, ProtocolVersion};
pub use error::{Error, Result};
pub use oid::ObjectId;
pub use refs::{AdvertisedRefs, Ref};
pub use refspec::{RefSpec, RefSpecSet};
