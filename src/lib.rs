//! A pure Rust implementation of the typebus protocol and broker, suitable
//! for embedding a broker or writing clients.
//!
//! The broker mediates message passing between local processes: clients
//! register under a unique name and identity, declare the typed shapes of
//! messages they accept, and exchange byte payloads routed by recipient name
//! and message type. Routing is structural: a message of type `T` sent to a
//! client that accepts a prefix supertype of `T` is delivered truncated to
//! the accepted shape.

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

use std::path::PathBuf;

pub mod broker;
pub mod protocol;

/// Attempts to determine the broker socket path from the runtime
/// environment, checking the following locations in order:
///   - $TYPEBUS_SOCKET
///   - $XDG_RUNTIME_DIR/typebus.sock
///
/// Returns None if neither variable is set.
pub fn socket_path_from_env() -> Option<PathBuf> {
    std::env::var("TYPEBUS_SOCKET")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("XDG_RUNTIME_DIR")
                .ok()
                .map(|dir| PathBuf::from(dir).join("typebus.sock"))
        })
}
