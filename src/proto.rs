//! SSH agent protocol structures.

pub mod error;
pub mod extension;
pub mod message;
pub mod privatekey;
pub mod signature;
pub mod userauth;

pub use self::error::{ProtoError, ProtoResult};
pub use self::message::*;
pub use self::privatekey::*;
pub use self::signature::*;
pub use self::userauth::UserAuthRequest;
