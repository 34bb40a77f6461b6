//! Hardware sequencer
//!
//! Drives the GPIO, clock, PWM and DMA blocks through the order the
//! serializer needs:
//!
//! ```text
//! Uninitialized -> ClockConfigured -> PwmConfigured -> DmaArmed
//!                                                        |
//!                           Idle <---- Transmitting <----+
//!                             |           ^
//!                             +-- arm ----+
//!
//! any state -> ShutDown (terminal)
//! ```
//!
//! Every register write is followed by a settling delay; the hardware gives
//! no handshake to wait on.

use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::hal::dma::{cs_bits, debug_bits, DmaReg, CS_CONFIG};
use crate::hal::gpio::pwm0_function;
use crate::hal::pwm::{ctl_bits, PwmReg, DMA_DREQ_THRESHOLD, DMA_PANIC_THRESHOLD, SERIALIZER_RANGE};
use crate::hal::Peripherals;
use embedded_hal::delay::DelayNs;
use log::{debug, info};

/// Where the hardware is in its setup and transmit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwState {
    Uninitialized,
    ClockConfigured,
    PwmConfigured,
    DmaArmed,
    Transmitting,
    Idle,
    ShutDown,
}

/// Owns the register blocks and applies writes in order
pub struct Sequencer<D: DelayNs> {
    hw: Peripherals,
    delay: D,
    state: HwState,
    settle_us: u32,
    dmac_settle_us: u32,
}

impl<D: DelayNs> Sequencer<D> {
    pub fn new(hw: Peripherals, delay: D) -> Self {
        Self {
            hw,
            delay,
            state: HwState::Uninitialized,
            settle_us: TimingConfig::DEFAULT_SETTLE_US,
            dmac_settle_us: TimingConfig::DEFAULT_DMAC_SETTLE_US,
        }
    }

    pub fn state(&self) -> HwState {
        self.state
    }

    pub fn peripherals(&self) -> &Peripherals {
        &self.hw
    }

    #[cfg(test)]
    pub(crate) fn delay(&self) -> &D {
        &self.delay
    }

    /// Block for `us` microseconds using the sequencer's delay source
    pub fn wait_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn settle(&mut self) {
        self.delay.delay_us(self.settle_us);
    }

    /// Route `pin` to PWM0 and bring the clock and PWM into serializer mode
    pub fn init(&mut self, pin: u8, timing: &TimingConfig) -> Result<()> {
        if self.state != HwState::Uninitialized {
            return Err(Error::validation(format!(
                "hardware already initialized (state {:?})",
                self.state
            )));
        }
        let function = pwm0_function(pin)
            .ok_or_else(|| Error::validation(format!("GPIO{} has no PWM0 function", pin)))?;
        let source = timing.clock_source()?;
        let divisor = timing.divisor()?;
        self.settle_us = timing.settle_us;
        self.dmac_settle_us = timing.dmac_settle_us;

        info!("Configuring GPIO{} as {:?} for PWM0", pin, function);
        self.hw.gpio.set_mode(pin, function)?;
        self.settle();

        debug!("Stopping any running DMA transfer");
        self.hw.dma.set_cs(cs_bits::ABORT);
        self.settle();
        self.hw.dma.write(DmaReg::Cs, cs_bits::RESET);
        self.settle();

        debug!(
            "PWM clock: source {:?}, divisor {}.{}/1024",
            source, divisor.integer, divisor.fraction
        );
        self.hw.clock.kill();
        self.settle();
        self.hw.pwm.disable_dma();
        self.settle();
        self.hw.clock.set_divisor(divisor);
        self.settle();
        self.hw.clock.enable(source);
        self.settle();
        self.state = HwState::ClockConfigured;

        self.hw.pwm.write(PwmReg::Ctl, 0);
        self.hw.pwm.write(PwmReg::Rng1, SERIALIZER_RANGE);
        self.settle();
        self.hw.pwm.enable_dma(DMA_PANIC_THRESHOLD, DMA_DREQ_THRESHOLD);
        self.delay.delay_us(self.dmac_settle_us);
        self.hw.pwm.set_ctl(ctl_bits::CLRF1);
        self.settle();
        self.hw.pwm.clear_ctl(ctl_bits::RPTL1);
        self.settle();
        self.hw.pwm.clear_ctl(ctl_bits::SBIT1);
        self.settle();
        self.hw.pwm.clear_ctl(ctl_bits::POLA1);
        self.settle();
        self.hw.pwm.set_ctl(ctl_bits::MODE1);
        self.settle();
        self.hw.pwm.set_ctl(ctl_bits::USEF1);
        self.settle();
        self.hw.pwm.clear_ctl(ctl_bits::MSEN1);
        self.settle();
        self.state = HwState::PwmConfigured;

        info!("PWM serializer ready");
        Ok(())
    }

    /// Point the DMA engine at the control block at bus address `cb_bus`
    pub fn arm(&mut self, cb_bus: u32) -> Result<()> {
        match self.state {
            HwState::PwmConfigured | HwState::Idle | HwState::DmaArmed => {}
            HwState::ShutDown => return Err(Error::NotInitialized),
            other => {
                return Err(Error::validation(format!(
                    "cannot arm DMA in state {:?}",
                    other
                )))
            }
        }
        // INT and END are write-one-to-clear
        self.hw.dma.set_cs(cs_bits::INT);
        self.settle();
        self.hw.dma.set_cs(cs_bits::END);
        self.settle();
        self.hw.dma.write(DmaReg::ConblkAd, cb_bus);
        self.settle();
        self.hw.dma.write(DmaReg::Debug, debug_bits::ERRORS);
        self.settle();
        self.state = HwState::DmaArmed;
        Ok(())
    }

    /// Start the DMA engine, then the serializer
    pub fn start(&mut self, cb_bus: u32) -> Result<()> {
        match self.state {
            HwState::DmaArmed => {}
            HwState::ShutDown => return Err(Error::NotInitialized),
            other => {
                return Err(Error::validation(format!(
                    "cannot start a transfer in state {:?}",
                    other
                )))
            }
        }
        self.hw.dma.write(DmaReg::ConblkAd, cb_bus);
        self.hw.dma.write(DmaReg::Cs, CS_CONFIG | cs_bits::ACTIVE);
        self.settle();
        // PWM must not run ahead of the DMA engine
        self.hw.pwm.set_ctl(ctl_bits::PWEN1);
        self.state = HwState::Transmitting;
        Ok(())
    }

    /// Mark the in-flight transfer as complete
    pub fn finish(&mut self) {
        if self.state == HwState::Transmitting {
            self.state = HwState::Idle;
        }
    }

    /// Stop DMA and PWM; safe to call in any state, repeated calls do nothing
    pub fn teardown(&mut self) {
        if self.state == HwState::ShutDown {
            return;
        }
        debug!("Stopping DMA channel");
        self.hw.dma.clear_cs(cs_bits::ACTIVE);
        self.settle();
        self.hw.dma.set_cs(cs_bits::RESET);
        self.settle();

        debug!("Stopping PWM");
        self.hw.pwm.clear_ctl(ctl_bits::PWEN1);
        self.settle();
        self.hw.pwm.write(PwmReg::Ctl, ctl_bits::CLRF1);

        self.state = HwState::ShutDown;
        info!("Hardware released");
    }
}
