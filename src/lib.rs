pub mod config;
pub mod console;
pub mod dispatcher;
pub mod gateway;
pub mod logging;
pub mod punish;
pub mod stream;

pub const SERVICE_NAME: &str = "warden_hub";
pub const HUB_TARGET: &str = "warden_hub::stream";
pub const PUNISH_TARGET: &str = "warden_hub::punish";
pub const DISPATCH_TARGET: &str = "warden_hub::dispatch";
pub const ERROR_TARGET: &str = "warden_hub::error";
pub const CONSOLE_TARGET: &str = "warden_hub";

pub use config::Config;
pub use dispatcher::{DispatchError, Dispatcher, PunishResponse};
pub use gateway::{MemoryGateway, PersistenceGateway};
pub use stream::Hub;
pub type Error = Box<dyn std::error::Error + Send + Sync>;
