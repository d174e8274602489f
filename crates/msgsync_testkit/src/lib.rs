//! # msgsync Testkit
//!
//! Test utilities for msgsync.
//!
//! This crate provides:
//! - Fixtures for users, conversations, connections and events
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use msgsync_testkit::prelude::*;
//!
//! let conversation = group("team-chat", SELF_DOMAIN, &[self_user(), user("bob", "foo.com")]);
//! let event = member_join("0001", &conversation.id, &[user("carol", "bar.org")]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
