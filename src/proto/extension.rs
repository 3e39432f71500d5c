//! Agent protocol extensions.
//!
//! Extensions come in two kinds: *message* extensions carried by
//! `SSH_AGENTC_EXTENSION` and *key constraint* extensions carried as TLV 255
//! inside constrained Add-Identity messages. Dispatch is by name: a typed
//! extension declares its `NAME` and is parsed out of an
//! [`Extension`](crate::proto::Extension) container with
//! [`parse_message`](crate::proto::Extension::parse_message) /
//! [`parse_key_constraint`](crate::proto::Extension::parse_key_constraint).

mod restrict_destination;
mod session_bind;

pub use self::restrict_destination::{
    DestinationConstraint, HopDescriptor, HopKey, MatchInfo, RestrictDestination,
};
pub use self::session_bind::SessionBind;

/// A named extension usable as an `SSH_AGENTC_EXTENSION` message body.
pub trait MessageExtension {
    /// Extension name, suffixed by the implementation domain.
    const NAME: &'static str;
}

/// A named extension usable as a key constraint (TLV 255).
pub trait KeyConstraintExtension {
    /// Extension name, suffixed by the implementation domain.
    const NAME: &'static str;
}
