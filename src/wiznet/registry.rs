use anyhow::Result;
use log::debug;

use crate::error::DriverError;

// Number of chips a single registry tracks by default
pub const MAX_DEVICES: usize = 4;

/// Identity table for initialized chips.
///
/// Constructed by the caller and handed to `Wiznet::init` / `Wiznet::deinit`,
/// a device holds its slot index as identity while bound.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<bool>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_DEVICES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Registry {
            slots: vec![false; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|taken| **taken).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bound(&self, id: usize) -> bool {
        self.slots.get(id).copied().unwrap_or(false)
    }

    // Take the lowest free identity
    pub(crate) fn bind(&mut self) -> Result<usize> {
        let id = self
            .slots
            .iter()
            .position(|taken| !taken)
            .ok_or(DriverError::RegistryFull {
                capacity: self.capacity(),
            })?;

        self.slots[id] = true;
        debug!("Registry: bound device {}", id);
        Ok(id)
    }

    pub(crate) fn unbind(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = false;
            debug!("Registry: unbound device {}", id);
        }
    }
}
