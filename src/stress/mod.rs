pub mod bandwidth;
pub mod client;
pub mod echo;
pub mod error;
pub mod server;
pub mod session;

pub use self::bandwidth::*;
pub use self::client::*;
pub use self::echo::*;
pub use self::error::*;
pub use self::server::*;
pub use self::session::*;
