//! SSH agent protocol messages.

mod add_remove;
mod extension;
mod identity;
mod request;
mod response;
mod sign;
mod unparsed;

pub use self::add_remove::*;
pub use self::extension::Extension;
pub use self::identity::Identity;
pub use self::request::Request;
pub use self::response::Response;
pub use self::sign::SignRequest;
pub use self::unparsed::Unparsed;
