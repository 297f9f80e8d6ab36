//! PL011-style UART: data, flag and configuration registers with bounded
//! receive and transmit FIFOs. The host drains the transmit side.

use std::collections::VecDeque;

use super::{Peripheral, PeripheralError};

/// Data register.
pub const UARTDR: u32 = 0x000;
/// Receive status / error clear register.
pub const UARTRSR: u32 = 0x004;
/// Flag register.
pub const UARTFR: u32 = 0x018;
/// Integer baud-rate divisor.
pub const UARTIBRD: u32 = 0x024;
/// Fractional baud-rate divisor.
pub const UARTFBRD: u32 = 0x028;
/// Line control register.
pub const UARTLCR_H: u32 = 0x02c;
/// Control register.
pub const UARTCR: u32 = 0x030;

/// `UARTFR` busy bit.
pub const FR_BUSY: u32 = 1 << 3;
/// `UARTFR` receive FIFO empty.
pub const FR_RXFE: u32 = 1 << 4;
/// `UARTFR` transmit FIFO full.
pub const FR_TXFF: u32 = 1 << 5;
/// `UARTFR` receive FIFO full.
pub const FR_RXFF: u32 = 1 << 6;
/// `UARTFR` transmit FIFO empty.
pub const FR_TXFE: u32 = 1 << 7;

/// Depth of each FIFO.
pub const UART_FIFO_DEPTH: usize = 32;

const CR_RESET: u32 = 0x0300;

/// One UART instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uart {
    rx: VecDeque<u8>,
    tx: VecDeque<u8>,
    ibrd: u32,
    fbrd: u32,
    lcr_h: u32,
    cr: u32,
}

impl Default for Uart {
    fn default() -> Self {
        Self {
            rx: VecDeque::with_capacity(UART_FIFO_DEPTH),
            tx: VecDeque::with_capacity(UART_FIFO_DEPTH),
            ibrd: 0,
            fbrd: 0,
            lcr_h: 0,
            cr: CR_RESET,
        }
    }
}

impl Uart {
    /// Queues host bytes on the receive side. Returns how many fit in the FIFO.
    pub fn host_write(&mut self, data: &[u8]) -> usize {
        let room = UART_FIFO_DEPTH - self.rx.len();
        let accepted = data.len().min(room);
        self.rx.extend(&data[..accepted]);
        accepted
    }

    /// Drains transmitted bytes into `buf`. Returns how many were copied.
    pub fn host_read(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.tx.len());
        for (slot, byte) in buf.iter_mut().zip(self.tx.drain(..count)) {
            *slot = byte;
        }
        count
    }

    /// Number of transmitted bytes not yet drained by the host.
    #[must_use]
    pub fn pending_tx(&self) -> usize {
        self.tx.len()
    }

    /// Number of received bytes not yet read by the program.
    #[must_use]
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.tx.is_empty() {
            flags |= FR_TXFE;
        } else {
            flags |= FR_BUSY;
        }
        if self.tx.len() == UART_FIFO_DEPTH {
            flags |= FR_TXFF;
        }
        if self.rx.is_empty() {
            flags |= FR_RXFE;
        }
        if self.rx.len() == UART_FIFO_DEPTH {
            flags |= FR_RXFF;
        }
        flags
    }
}

impl Peripheral for Uart {
    fn name(&self) -> &'static str {
        "uart"
    }

    fn read32(&mut self, offset: u32) -> Result<u32, PeripheralError> {
        match offset {
            UARTDR => Ok(self.rx.pop_front().map_or(0, u32::from)),
            UARTRSR => Ok(0),
            UARTFR => Ok(self.flags()),
            UARTIBRD => Ok(self.ibrd),
            UARTFBRD => Ok(self.fbrd),
            UARTLCR_H => Ok(self.lcr_h),
            UARTCR => Ok(self.cr),
            _ => Err(PeripheralError::NoSuchRegister),
        }
    }

    fn write32(&mut self, offset: u32, value: u32) -> Result<(), PeripheralError> {
        match offset {
            // A full transmit FIFO drops the byte.
            UARTDR => {
                if self.tx.len() < UART_FIFO_DEPTH {
                    self.tx.push_back(value.to_le_bytes()[0]);
                }
            }
            UARTRSR => {}
            UARTFR => return Err(PeripheralError::ReadOnly),
            UARTIBRD => self.ibrd = value & 0xFFFF,
            UARTFBRD => self.fbrd = value & 0x3F,
            UARTLCR_H => self.lcr_h = value & 0xFF,
            UARTCR => self.cr = value & 0xFFFF,
            _ => return Err(PeripheralError::NoSuchRegister),
        }
        Ok(())
    }

    fn has_register(&self, offset: u32) -> bool {
        matches!(
            offset,
            UARTDR | UARTRSR | UARTFR | UARTIBRD | UARTFBRD | UARTLCR_H | UARTCR
        )
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
