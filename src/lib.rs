pub mod completion;
pub mod config;
pub mod error;
pub mod live;
pub mod logging;
pub mod parser;
pub mod path;

pub use completion::{Completer, Completion};
pub use error::{ConfigError, EnvError};
pub use live::{LiveEnvironment, Session};
