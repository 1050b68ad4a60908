//! Protocol types shared by the codec, the connection loop and the app layer.

mod error;
mod head;
mod message;
mod method;

pub use error::{ListenError, ParseError};
pub use head::RequestHead;
pub use message::{Message, PayloadItem, PayloadSize};
pub use method::Method;
