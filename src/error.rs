use thiserror::Error;

/// Typed failures of the driver, carried inside `anyhow::Error`.
///
/// Socket level outcomes such as a full socket table or an open timeout are not errors,
/// they are reported through [`crate::wiznet::registers::SocketStatus`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("device registry is full ({capacity} devices)")]
    RegistryFull { capacity: usize },

    #[error("unexpected chip version {found:#04x}, expected {expected:#04x}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("device is not initialized")]
    DeviceNotBound,

    #[error("socket is not bound to a hardware slot")]
    SocketNotBound,

    #[error("socket is bound to another device")]
    ForeignSocket,

    #[error("no TX buffer space on socket {socket} within {timeout_ms} ms")]
    SendTimeout { socket: u8, timeout_ms: u128 },
}
