pub mod event;
pub mod proxy;
pub mod request;

pub use event::*;
pub use proxy::*;
pub use request::*;
