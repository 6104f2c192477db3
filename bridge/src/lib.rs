// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! Pin-level glue wiring the virtual DTM to the SWD bridge.
//!
//! This is the thinnest possible layer: four pin operations the host-facing
//! JTAG bit-banger drives directly, plus a [`VjtagBridge::connect()`] the
//! caller runs once (and may re-run after a failure) to bring the SW-DP up
//! before any DMI traffic is expected to succeed.

#![no_std]

use esp_hal::gpio::{InputPin, OutputPin};
#[allow(unused_imports)]
use log::info;

use vjtag_dtm::VirtualDtm;
use vjtag_swd::{SwdDmiBridge, SwdError, SwdProtocol};

/// Owns the JTAG-to-SWD bridge core: the virtual DTM driven by the host's
/// JTAG pins, wired to an SWD bridge driving the target's SWDIO/SWCLK pins.
pub struct VjtagBridge<'a> {
    dtm: VirtualDtm<SwdDmiBridge<'a>>,
}

impl<'a> VjtagBridge<'a> {
    /// Build the bridge. `idcode` is presented on the JTAG side after TAP
    /// reset; `targetsel` (0 to skip) and `apsel` configure the SWD side's
    /// connect sequence and AP selection.
    pub fn new(
        idcode: u32,
        targetsel: u32,
        apsel: u8,
        swdio_pin: impl InputPin + OutputPin + 'a,
        swclk_pin: impl OutputPin + 'a,
    ) -> Self {
        let protocol = SwdProtocol::new(swdio_pin, swclk_pin);
        let bridge = SwdDmiBridge::new(protocol, targetsel, apsel);
        let dtm = VirtualDtm::new(idcode, bridge);
        Self { dtm }
    }

    /// Run the SW-DP connect sequence: link reset, dormant/SWD selection,
    /// optional TARGETSEL, DPIDR read, debug/system power-up, and Mem-AP
    /// probe. Must succeed before DMI accesses will return real data.
    ///
    /// On failure the caller should retry from the top — nothing here is
    /// left half-configured in a way that requires unwinding.
    pub async fn connect(&mut self) -> Result<(), SwdError> {
        info!("connect: bringing up SW-DP");
        self.dtm.dmi_mut().connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.dtm.dmi().is_connected()
    }

    /// Set the TMS pin level, sampled on the next TCK rising edge.
    pub fn set_tms(&mut self, level: bool) {
        self.dtm.set_tms(level);
    }

    /// Set the TDI pin level, sampled on the next TCK rising edge.
    pub fn set_tdi(&mut self, level: bool) {
        self.dtm.set_tdi(level);
    }

    /// Set the TCK pin level. Edge-triggered: callers may toggle freely,
    /// levels that don't change from the last call are ignored.
    pub async fn set_tck(&mut self, level: bool) {
        self.dtm.set_tck(level).await;
    }

    /// Read the level currently being driven onto TDO.
    pub fn get_tdo(&self) -> bool {
        self.dtm.get_tdo()
    }
}
