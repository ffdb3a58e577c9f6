use std::time::Duration;

use anyhow::Result;

pub mod error;
pub mod sim;
pub mod wiznet;

/// Platform side of a chip: the serial link, the two control lines and a clock.
///
/// Every register access of the driver ends up in `select`, `transmit` and `receive`,
/// so an implementation may be a real SPI peripheral or the behavioral model in [`sim`].
pub trait ChipContext {
    // Assert (true) or release (false) chip select
    fn select(&mut self, selected: bool) -> Result<()>;

    // Raw byte exchange on the serial link
    fn transmit(&mut self, data: &[u8]) -> Result<()>;
    fn receive(&mut self, buffer: &mut [u8]) -> Result<()>;

    // Assert (true) or release (false) the hardware reset line
    fn set_reset(&mut self, asserted: bool) -> Result<()>;

    fn delay(&mut self, duration: Duration);

    /// Monotonic time since boot, used to bound every polling loop.
    fn uptime(&mut self) -> Duration;
}
