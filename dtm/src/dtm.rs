// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! The virtual RISC-V Debug Transport Module.
//!
//! Owns the JTAG instruction register, the data-register shifter, and the
//! RISC-V 0.13.2 DTM instruction semantics (IDCODE, DTMCS, DMI, BYPASS)
//! layered on top of the bare [`TapState`](crate::tap::TapState) machine.
//! Everything here is synchronous with the TAP: a DMI operation committed
//! by `UPDATE-DR` runs to completion before the next TCK rising edge is
//! processed, so there is no pipelining and no reordering.

use crate::callback::DmiCallback;
use crate::tap::{step, TapState};
use log::trace;

/// DMI address width in bits, fixed by this core's RISC-V debug spec
/// configuration.
pub const ABITS: u32 = 8;

/// Width of the `IR` data register, in bits.
const W_IR: u32 = 5;

/// Width of the `DMI` data register, in bits: `ABITS + 32 + 2`.
const W_DMI: u32 = ABITS + 32 + 2;

/// 5-bit JTAG instruction encodings. Anything else behaves as `BYPASS`.
const IR_BYPASS: u8 = 0x00;
const IR_IDCODE: u8 = 0x01;
const IR_DTMCS: u8 = 0x10;
const IR_DMI: u8 = 0x11;

/// `DTMCS` read value: `version=1` (bits 3:0), `abits=ABITS` (bits 7:4),
/// `idle=0` (bits 14:12).
const DTMCS_VALUE: u32 = 1 | (ABITS << 4);

/// Effective width, in bits, of the data register selected by `ir`.
fn dr_len(ir: u8) -> u32 {
    match ir {
        IR_BYPASS => 1,
        IR_IDCODE => 32,
        IR_DTMCS => 32,
        IR_DMI => W_DMI,
        _ => 1,
    }
}

/// The virtual DTM. Generic over the DMI callback it dispatches committed
/// operations to — owned by value, not boxed, so this stays allocation-free.
pub struct VirtualDtm<D: DmiCallback> {
    tap_state: TapState,
    ir: u8,
    shifter: u64,
    idcode: u32,
    dmi_rdata: u32,
    tck: bool,
    tms: bool,
    tdi: bool,
    tdo: bool,
    dmi: D,
}

impl<D: DmiCallback> VirtualDtm<D> {
    /// Construct a new DTM presenting `idcode` after reset, dispatching
    /// committed DMI operations to `dmi`.
    pub fn new(idcode: u32, dmi: D) -> Self {
        Self {
            tap_state: TapState::Reset,
            ir: IR_IDCODE,
            shifter: 0,
            idcode,
            dmi_rdata: 0,
            tck: false,
            tms: false,
            tdi: false,
            tdo: false,
            dmi,
        }
    }

    /// Current TAP state, mostly useful for tests.
    pub fn tap_state(&self) -> TapState {
        self.tap_state
    }

    /// Current instruction register contents.
    pub fn ir(&self) -> u8 {
        self.ir
    }

    /// Direct access to the DMI callback, for setup that happens outside
    /// the TAP (e.g. bringing up the underlying transport before the host
    /// starts clocking JTAG).
    pub fn dmi_mut(&mut self) -> &mut D {
        &mut self.dmi
    }

    /// Read-only access to the DMI callback, e.g. for status queries.
    pub fn dmi(&self) -> &D {
        &self.dmi
    }

    /// Set the TMS pin level. Sampled on the next TCK rising edge.
    pub fn set_tms(&mut self, level: bool) {
        self.tms = level;
    }

    /// Set the TDI pin level. Sampled on the next TCK rising edge.
    pub fn set_tdi(&mut self, level: bool) {
        self.tdi = level;
    }

    /// Read the last value driven onto TDO.
    pub fn get_tdo(&self) -> bool {
        self.tdo
    }

    /// Set the TCK pin level. Edge-triggered: rising edges step the TAP
    /// (and may dispatch a DMI operation on `UPDATE-DR`), falling edges
    /// recompute TDO. Callers may toggle freely; levels that don't change
    /// from the last call are ignored.
    pub async fn set_tck(&mut self, level: bool) {
        if level == self.tck {
            return;
        }
        self.tck = level;
        trace!("tck -> {}", level);
        if level {
            self.tck_rising().await;
        } else {
            self.tdo = self.compute_tdo();
        }
    }

    fn compute_tdo(&self) -> bool {
        self.tap_state.is_shift() && (self.shifter & 1) == 1
    }

    async fn tck_rising(&mut self) {
        match self.tap_state {
            TapState::Reset => {
                self.ir = IR_IDCODE;
            }
            TapState::CaptureIr => {
                self.shifter = self.ir as u64;
            }
            TapState::ShiftIr => {
                let tdi = self.tdi as u64;
                self.shifter = (self.shifter >> 1) | (tdi << (W_IR - 1));
            }
            TapState::UpdateIr => {
                self.ir = (self.shifter as u8) & 0x1F;
                trace!("ir <- {:#04x}", self.ir);
            }
            TapState::CaptureDr => {
                self.shifter = self.capture_dr();
            }
            TapState::ShiftDr => {
                let width = dr_len(self.ir);
                let tdi = self.tdi as u64;
                self.shifter = (self.shifter >> 1) | (tdi << (width - 1));
            }
            TapState::UpdateDr => {
                self.update_dr().await;
            }
            _ => {}
        }

        let next = step(self.tap_state, self.tms);
        trace!("tap {:?} -> {:?} (tms={})", self.tap_state, next, self.tms);
        self.tap_state = next;
    }

    /// Value loaded into the shifter on `CAPTURE-DR`, per the instruction
    /// currently selected.
    fn capture_dr(&self) -> u64 {
        match self.ir {
            IR_BYPASS => 0,
            IR_IDCODE => self.idcode as u64,
            IR_DTMCS => DTMCS_VALUE as u64,
            IR_DMI => (self.dmi_rdata as u64) << 2,
            _ => 0,
        }
    }

    /// Commit the shifter on `UPDATE-DR`, per the instruction currently
    /// selected. Only `DMI` has an observable effect.
    async fn update_dr(&mut self) {
        if self.ir != IR_DMI {
            return;
        }

        let op = (self.shifter & 0x3) as u8;
        let data = ((self.shifter >> 2) & 0xFFFF_FFFF) as u32;
        let addr = ((self.shifter >> (2 + 32)) & ((1u64 << ABITS) - 1)) as u8;

        match op {
            2 => {
                trace!("dmi write addr={:#04x} data={:#010x}", addr, data);
                self.dmi.dmi_write(addr, data).await;
            }
            1 => {
                let result = self.dmi.dmi_read(addr).await;
                trace!("dmi read addr={:#04x} -> {:#010x}", addr, result);
                self.dmi_rdata = result;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct FakeDmi {
        mem: Rc<RefCell<BTreeMap<u8, u32>>>,
        writes: Rc<RefCell<Vec<(u8, u32)>>>,
    }

    impl DmiCallback for FakeDmi {
        async fn dmi_write(&mut self, addr: u8, data: u32) {
            self.writes.borrow_mut().push((addr, data));
            self.mem.borrow_mut().insert(addr, data);
        }

        async fn dmi_read(&mut self, addr: u8) -> u32 {
            *self.mem.borrow().get(&addr).unwrap_or(&0)
        }
    }

    async fn reset(dtm: &mut VirtualDtm<FakeDmi>) {
        for _ in 0..5 {
            dtm.set_tms(true);
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
    }

    async fn shift_bits(dtm: &mut VirtualDtm<FakeDmi>, bits: &[bool], exit_high_on_last: bool) -> Vec<bool> {
        let mut tdo = Vec::with_capacity(bits.len());
        for (i, &bit) in bits.iter().enumerate() {
            let is_last = i == bits.len() - 1;
            dtm.set_tdi(bit);
            dtm.set_tms(is_last && exit_high_on_last);
            dtm.set_tck(true).await;
            tdo.push(dtm.get_tdo());
            dtm.set_tck(false).await;
        }
        tdo
    }

    #[pollster::test]
    async fn five_tms_high_resets_tap() {
        let mut dtm = VirtualDtm::new(0xDEAD_BEEF, FakeDmi::default());
        reset(&mut dtm).await;
        assert_eq!(dtm.tap_state(), TapState::Reset);
        assert_eq!(dtm.ir(), IR_IDCODE);
    }

    #[pollster::test]
    async fn idcode_readback_after_reset() {
        let mut dtm = VirtualDtm::new(0xDEAD_BEEF, FakeDmi::default());
        reset(&mut dtm).await;
        dtm.set_tms(false);
        dtm.set_tck(true).await; // RUN-IDLE
        dtm.set_tck(false).await;

        navigate_to_shift_dr(&mut dtm).await;

        let bits = shift_bits(&mut dtm, &[false; 32], false).await;
        let mut value: u32 = 0;
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                value |= 1 << i;
            }
        }
        assert_eq!(value, 0xDEAD_BEEF);
    }

    #[pollster::test]
    async fn ir_update_to_dmi() {
        let mut dtm = VirtualDtm::new(0, FakeDmi::default());
        reset(&mut dtm).await;
        // RUN-IDLE -> SELECT-DR -> SELECT-IR -> CAPTURE-IR -> SHIFT-IR
        for tms in [false, true, true, false, false] {
            dtm.set_tms(tms);
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
        assert_eq!(dtm.tap_state(), TapState::ShiftIr);

        // 0b10001 LSB-first: 1,0,0,0,1 with TMS=1 on the last bit -> EXIT1-IR
        let bits = [true, false, false, false, true];
        for (i, &bit) in bits.iter().enumerate() {
            dtm.set_tdi(bit);
            dtm.set_tms(i == bits.len() - 1);
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
        assert_eq!(dtm.tap_state(), TapState::Exit1Ir);

        dtm.set_tms(true); // -> UPDATE-IR
        dtm.set_tck(true).await;
        dtm.set_tck(false).await;
        assert_eq!(dtm.tap_state(), TapState::UpdateIr);
        assert_eq!(dtm.ir(), IR_DMI);
    }

    #[pollster::test]
    async fn bypass_dr_scan_returns_input_delayed_by_one_bit() {
        let mut dtm = VirtualDtm::new(0, FakeDmi::default());
        reset(&mut dtm).await;
        force_ir(&mut dtm, IR_BYPASS).await;
        navigate_to_shift_dr(&mut dtm).await;

        let input = [true, false, true, true, false];
        let output = shift_bits(&mut dtm, &input, false).await;

        // Bit 0 of the output is 0 (BYPASS captures a single 0 bit); every
        // later output bit is the input shifted right by one.
        assert!(!output[0]);
        assert_eq!(&output[1..], &input[..input.len() - 1]);
    }

    #[pollster::test]
    async fn dmi_write_dispatches_exactly_once() {
        let callback = FakeDmi::default();
        let writes = callback.writes.clone();
        let mut dtm = VirtualDtm::new(0, callback);
        reset(&mut dtm).await;
        force_ir(&mut dtm, IR_DMI).await;
        navigate_to_shift_dr(&mut dtm).await;

        let value: u64 = (0x10u64 << 34) | (0x0000_0001u64 << 2) | 0x2;
        drive_shift_dr(&mut dtm, value, W_DMI).await;

        assert_eq!(writes.borrow().as_slice(), &[(0x10, 0x0000_0001)]);
    }

    #[pollster::test]
    async fn dmi_read_round_trip() {
        let callback = FakeDmi::default();
        callback.mem.borrow_mut().insert(0x11, 0x1234_5678);
        let mut dtm = VirtualDtm::new(0, callback);
        reset(&mut dtm).await;
        force_ir(&mut dtm, IR_DMI).await;
        navigate_to_shift_dr(&mut dtm).await;

        let value: u64 = (0x11u64 << 34) | 0x1; // op=READ
        drive_shift_dr(&mut dtm, value, W_DMI).await;

        // UPDATE-DR -> RUN-IDLE -> SELECT-DR -> CAPTURE-DR loads dmi_rdata
        navigate_to_shift_dr(&mut dtm).await;
        let bits = shift_bits(&mut dtm, &[false; W_DMI as usize], false).await;
        let mut captured: u64 = 0;
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                captured |= 1 << i;
            }
        }
        assert_eq!((captured >> 2) & 0xFFFF_FFFF, 0x1234_5678);
    }

    async fn force_ir(dtm: &mut VirtualDtm<FakeDmi>, ir: u8) {
        // RUN-IDLE -> SELECT-DR -> SELECT-IR -> CAPTURE-IR -> SHIFT-IR
        for tms in [false, true, true, false, false] {
            dtm.set_tms(tms);
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
        for i in 0..5 {
            let bit = (ir >> i) & 1 == 1;
            dtm.set_tdi(bit);
            dtm.set_tms(i == 4); // last bit exits to EXIT1-IR
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
        dtm.set_tms(true); // -> UPDATE-IR
        dtm.set_tck(true).await;
        dtm.set_tck(false).await;
        dtm.set_tms(false); // -> RUN-IDLE
        dtm.set_tck(true).await;
        dtm.set_tck(false).await;
        assert_eq!(dtm.ir(), ir);
    }

    async fn navigate_to_shift_dr(dtm: &mut VirtualDtm<FakeDmi>) {
        for tms in [true, false, false] {
            dtm.set_tms(tms);
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
        assert_eq!(dtm.tap_state(), TapState::ShiftDr);
    }

    async fn drive_shift_dr(dtm: &mut VirtualDtm<FakeDmi>, value: u64, width: u32) {
        for i in 0..width {
            let bit = (value >> i) & 1 == 1;
            dtm.set_tdi(bit);
            dtm.set_tms(i == width - 1);
            dtm.set_tck(true).await;
            dtm.set_tck(false).await;
        }
        assert_eq!(dtm.tap_state(), TapState::Exit1Dr);
        dtm.set_tms(true); // -> UPDATE-DR
        dtm.set_tck(true).await;
        dtm.set_tck(false).await;
        assert_eq!(dtm.tap_state(), TapState::UpdateDr);

        // The UPDATE-DR effect commits on the edge where UPDATE-DR is the
        // *current* state, same as IR above: one more pulse is needed.
        dtm.set_tms(false); // -> RUN-IDLE
        dtm.set_tck(true).await;
        dtm.set_tck(false).await;
        assert_eq!(dtm.tap_state(), TapState::RunIdle);
    }
}
