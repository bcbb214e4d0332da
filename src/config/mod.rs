mod settings;

pub use settings::{
    CoordinatorConfig, LoggingConfig, Settings, WebSocketConfig, DEVELOPMENT_ENDPOINT,
};
