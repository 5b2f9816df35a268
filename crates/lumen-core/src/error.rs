//! Error types for the Lumen agent

use thiserror::Error;

/// Core Lumen errors
#[derive(Error, Debug)]
pub enum LumenError {
    // Setup errors
    #[error("Failed to initialize platform: {0}")]
    PlatformInit(String),

    #[error("Failed on serializer init: {0}")]
    SerializerInit(String),

    #[error("Failed to create connection: {0}")]
    ConnectionCreate(String),

    #[error("Failed to create model instance: {0}")]
    ModelCreate(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Device id must not be empty")]
    InvalidDeviceId,

    // Message errors
    #[error("Failed to serialize: {0}")]
    Serialization(String),

    #[error("Message too large: {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Unable to register message callback: {0}")]
    CallbackRegistration(String),

    #[error("Failed to hand over the message to the transport: {0}")]
    SendRejected(String),

    #[error("Message content is not a byte array")]
    ContentTypeMismatch,

    #[error("Failed to allocate {0} bytes for command buffer")]
    BufferAllocation(usize),

    #[error("Command is not valid text: {0}")]
    InvalidCommand(String),

    // Time errors
    #[error("Time sync failed: {0}")]
    TimeSync(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Lumen operations
pub type LumenResult<T> = Result<T, LumenError>;
