// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! The SWD-DMI bridge: connects to the target's SW-DP, then maps each DMI
//! register access onto a word-sized Mem-AP transfer.
//!
//! This owns the only mutable state the bridge half of the system needs:
//! the AP/target selectors fixed at construction, the DP SELECT value last
//! written, and a single-entry TAR cache. It implements
//! [`vjtag_dtm::DmiCallback`] directly, so an outer container can hand one
//! of these straight to a [`vjtag_dtm::VirtualDtm`] as its DMI back end.

#[allow(unused_imports)]
use log::{debug, trace, warn};

use vjtag_core::arm::ap::{Idr, IdrRegister};
use vjtag_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister,
    Select, SelectRegister, TargetSel, TargetSelRegister,
};
use vjtag_core::arm::map::{Drw, DrwRegister, Tar, TarRegister};
use vjtag_core::arm::register::{ApRegister, DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use vjtag_dtm::DmiCallback;

use crate::protocol::{Speed, SwdProtocol, POST_SINGLE_OPERATION_CYCLES, calculate_parity};
use crate::SwdError;

use core::fmt;

/// Iterations to poll CTRL/STAT for power-up acknowledgement before
/// declaring the connect sequence failed.
const PWRUP_ACK_TIMEOUT: u32 = 10_000;

/// One low-level SWD register access: which kind of port, and is it a read
/// or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwdOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl SwdOp {
    fn to_cmd(self) -> u8 {
        // SWD cmd: [start][APnDP][RnW][A3][A2][parity][stop][park]
        let (base, addr) = match self {
            SwdOp::DpRead(a) => (0x85, a),  // start=1, APnDP=0, RnW=1, park=1
            SwdOp::DpWrite(a) => (0x81, a), // start=1, APnDP=0, RnW=0, park=1
            SwdOp::ApRead(a) => (0x87, a),  // start=1, APnDP=1, RnW=1, park=1
            SwdOp::ApWrite(a) => (0x83, a), // start=1, APnDP=1, RnW=0, park=1
        };

        let cmd = base | ((addr & 0x0C) << 1); // A[3:2] into bits 4:3
        Self::add_parity(cmd)
    }

    fn add_parity(cmd: u8) -> u8 {
        let parity_bits = cmd & 0x1E;
        let parity = calculate_parity(parity_bits) as u8;
        cmd | (parity << 5)
    }

    /// The SELECT bank bits this operation requires, and the mask covering
    /// them.
    fn required_select_bits(self) -> (u32, u32) {
        match self {
            SwdOp::DpRead(addr) | SwdOp::DpWrite(addr) => {
                let bank = (((addr >> 4) & 0xF) << Select::DPBANKSEL_SHIFT) as u32;
                let mask = Select::DPBANKSEL_MASK << Select::DPBANKSEL_SHIFT;
                (bank, mask)
            }
            SwdOp::ApRead(addr) | SwdOp::ApWrite(addr) => {
                let bank = (((addr >> 4) & 0xF) << Select::APBANKSEL_SHIFT) as u32;
                let mask = Select::APBANKSEL_MASK << Select::APBANKSEL_SHIFT;
                (bank, mask)
            }
        }
    }

    /// Whether changing the DP SELECT bank matters for this operation —
    /// ABORT, SELECT and RDBUFF/TARGETSEL never need it.
    fn needs_select_check(self) -> bool {
        match self {
            SwdOp::DpWrite(addr) => {
                !matches!(addr, AbortRegister::ADDRESS | SelectRegister::ADDRESS | RdBuffRegister::ADDRESS)
            }
            SwdOp::DpRead(addr) => {
                !matches!(addr, IdCodeRegister::ADDRESS | SelectRegister::ADDRESS | RdBuffRegister::ADDRESS)
            }
            SwdOp::ApWrite(_) | SwdOp::ApRead(_) => true,
        }
    }
}

impl fmt::Display for SwdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdOp::DpRead(a) => write!(f, "DP read {a:#04x}"),
            SwdOp::DpWrite(a) => write!(f, "DP write {a:#04x}"),
            SwdOp::ApRead(a) => write!(f, "AP read {a:#04x}"),
            SwdOp::ApWrite(a) => write!(f, "AP write {a:#04x}"),
        }
    }
}

/// Whether `cache` already holds the TAR value `dmi_addr` maps to, factored
/// out of `resolve_tar` so the cache policy (one TAR write per unique
/// consecutive DMI address) is testable without any SWD hardware attached.
fn tar_cache_hit(cache: Option<u32>, dmi_addr: u8) -> bool {
    cache == Some((dmi_addr as u32) << 2)
}

/// Bridges JTAG-side DMI register accesses onto SWD Mem-AP transfers.
pub struct SwdDmiBridge<'a> {
    protocol: SwdProtocol<'a>,
    targetsel: u32,
    apsel: u8,
    dp_select: Select,
    tar_cache: Option<u32>,
    connected: bool,
}

impl<'a> SwdDmiBridge<'a> {
    /// Construct a new bridge. `targetsel` of 0 means "never emit
    /// TARGETSEL" (non-multi-drop target); `apsel` selects which AP the
    /// Mem-AP window sits behind.
    pub fn new(protocol: SwdProtocol<'a>, targetsel: u32, apsel: u8) -> Self {
        Self {
            protocol,
            targetsel,
            apsel,
            dp_select: Select::default(),
            tar_cache: None,
            connected: false,
        }
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.protocol.set_speed(speed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Bring up the SW-DP from cold: dormant/SWD selection, TARGETSEL (if
    /// configured), DPIDR, ABORT clear, debug/system power-up, and probing
    /// the target AP to confirm it is the Mem-AP this bridge expects.
    ///
    /// On success the DP SELECT register is left pointing at AP bank 0
    /// (CSW/TAR/DRW) for the session. On any non-OK ACK or a power-up
    /// timeout, returns an error — callers should retry the entire sequence
    /// from the top.
    pub async fn connect(&mut self) -> Result<(), SwdError> {
        trace!("connect: dormant/SWD line selection");
        self.connected = false;
        self.tar_cache = None;
        self.dp_select = Select::default();

        self.protocol.reset_prep().await;

        self.protocol.pre_line_reset();
        embassy_time::Timer::after_micros(100).await;

        self.protocol.swd_to_dormant_sequence();
        embassy_time::Timer::after_micros(100).await;

        self.protocol.pre_line_reset();
        embassy_time::Timer::after_micros(100).await;

        self.protocol.pre_sel_alert_seq();
        self.protocol.sel_alert_seq();
        self.protocol.post_sel_alert_seq();
        self.protocol.swd_act_code();

        self.protocol.line_reset_after().await;

        if self.targetsel != 0 {
            self.do_write_target_sel(TargetSel::new(self.targetsel)).await?;
        }

        let dpidr: IdCode = self.read_dp_register(IdCodeRegister).await?;
        debug!("connect: DPIDR {dpidr}");

        self.write_dp_register(AbortRegister, Abort::CLEAR_ALL).await?;

        self.update_dp_select(Select::default()).await?;

        let mut ctrl_stat = CtrlStat::default();
        ctrl_stat.set_cdbgpwrupreq(true);
        ctrl_stat.set_csyspwrupreq(true);
        ctrl_stat.set_orundetect(true);
        self.write_dp_register(CtrlStatRegister, ctrl_stat).await?;

        let mut acked = false;
        for _ in 0..PWRUP_ACK_TIMEOUT {
            let status: CtrlStat = self.read_dp_register(CtrlStatRegister).await?;
            if status.cdbgpwrupack() && status.csyspwrupack() {
                acked = true;
                break;
            }
        }
        if !acked {
            return Err(SwdError::ConnectTimeout);
        }

        let mut select = Select::default();
        select.set_apsel(self.apsel);
        select.set_apbanksel(0xF);
        self.update_dp_select(select).await?;

        let idr: Idr = self.read_ap_register(IdrRegister).await?;
        if !idr.is_apb_mem_ap() {
            return Err(SwdError::OperationFailed("probed AP is not an APB Mem-AP"));
        }

        let mut select = Select::default();
        select.set_apsel(self.apsel);
        select.set_apbanksel(0x0);
        self.update_dp_select(select).await?;

        debug!("connect: bridge up, IDR {idr}");
        self.connected = true;
        Ok(())
    }

    async fn resolve_tar(&mut self, dmi_addr: u8) -> Result<(), SwdError> {
        if !tar_cache_hit(self.tar_cache, dmi_addr) {
            let byte_addr = (dmi_addr as u32) << 2;
            self.write_ap_register(TarRegister, Tar::new(byte_addr)).await?;
            self.tar_cache = Some(byte_addr);
        }
        Ok(())
    }

    async fn dmi_write_inner(&mut self, addr: u8, data: u32) -> Result<(), SwdError> {
        if !self.connected {
            return Err(SwdError::NotReady);
        }
        self.resolve_tar(addr).await?;
        self.write_ap_register(DrwRegister, Drw::new(data)).await
    }

    async fn dmi_read_inner(&mut self, addr: u8) -> Result<u32, SwdError> {
        if !self.connected {
            return Err(SwdError::NotReady);
        }
        self.resolve_tar(addr).await?;
        let drw: Drw = self.read_ap_register(DrwRegister).await?;
        Ok(drw.value())
    }

    pub async fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        u32: From<R::Value>,
    {
        let op = SwdOp::DpWrite(R::ADDRESS);
        let raw_data = R::to_raw(value);
        self.write_operation(op, raw_data).await
    }

    pub async fn write_ap_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        u32: From<R::Value>,
    {
        let op = SwdOp::ApWrite(R::ADDRESS);
        let raw_data = R::to_raw(value);
        self.write_operation(op, raw_data).await
    }

    pub async fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let op = SwdOp::DpRead(R::ADDRESS);
        let raw_data = self.read_operation(op).await?;
        Ok(R::from_raw(raw_data))
    }

    pub async fn read_ap_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let op = SwdOp::ApRead(R::ADDRESS);
        let raw_data = self.read_operation(op).await?;
        Ok(R::from_raw(raw_data))
    }

    async fn update_dp_select(&mut self, select: Select) -> Result<(), SwdError> {
        self.do_write_op(SwdOp::DpWrite(SelectRegister::ADDRESS), select.into())
            .await?;
        self.dp_select = select;
        Ok(())
    }

    async fn check_and_update_dp_select(&mut self, op: SwdOp) -> Result<(), SwdError> {
        if !op.needs_select_check() {
            return Ok(());
        }

        let (bank, mask) = op.required_select_bits();
        if (self.dp_select.value() & mask) == bank {
            return Ok(());
        }

        let mut select = self.dp_select;
        match op {
            SwdOp::DpRead(addr) | SwdOp::DpWrite(addr) => select.set_dpbanksel_from_addr(addr),
            SwdOp::ApRead(addr) | SwdOp::ApWrite(addr) => select.set_apbanksel_from_addr(addr),
        }
        self.update_dp_select(select).await
    }

    async fn write_operation(&mut self, op: SwdOp, data: u32) -> Result<(), SwdError> {
        self.check_and_update_dp_select(op).await?;
        self.do_write_op(op, data).await
    }

    /// Handles both DP and AP reads. AP reads take two SWD transactions —
    /// the initial read returns whatever was posted from a previous access,
    /// so the real data has to be picked up from RDBUFF afterwards.
    async fn read_operation(&mut self, op: SwdOp) -> Result<u32, SwdError> {
        self.check_and_update_dp_select(op).await?;

        match op {
            SwdOp::DpRead(_) => self.do_read_op(op).await,
            SwdOp::ApRead(_) => {
                self.do_read_op(op).await?;
                self.do_read_op(SwdOp::DpRead(RdBuffRegister::ADDRESS)).await
            }
            SwdOp::ApWrite(_) | SwdOp::DpWrite(_) => {
                unreachable!("read_operation called with a write op")
            }
        }
    }

    /// One read/write exchange is attempted exactly once: with `ORUNDETECT`
    /// set during connect, a `WAIT` response is a sticky error, not
    /// something to retry inside the core — it propagates to the caller.
    async fn do_write_op(&mut self, op: SwdOp, data: u32) -> Result<(), SwdError> {
        let cmd = op.to_cmd();
        trace!("exec {op}: cmd {cmd:#04x} data {data:#010x}");

        self.protocol.set_swdio_output();
        self.protocol.write_cmd_turnaround(cmd);

        self.protocol.read_ack().inspect_err(|e| debug!("error {op} data={data:#010x}: {e}"))?;

        self.protocol.turnaround_write_u32_parity(data);

        // 2 extra SWCLK cycles required after a write, after parity
        self.protocol.set_swdio_low();
        self.protocol.clock(2);
        self.protocol.clock(POST_SINGLE_OPERATION_CYCLES - 2);

        trace!("ok {op}");
        Ok(())
    }

    async fn do_read_op(&mut self, op: SwdOp) -> Result<u32, SwdError> {
        let cmd = op.to_cmd();
        trace!("exec {op}: cmd {cmd:#04x}");

        self.protocol.set_swdio_output();
        self.protocol.write_cmd_turnaround(cmd);

        self.protocol.read_ack().inspect_err(|e| debug!("error {op}: {e}"))?;

        let data = self.protocol.read_u32_parity_turnaround()?;
        self.protocol.clock(POST_SINGLE_OPERATION_CYCLES);
        trace!("ok {op}: {data:#010x}");
        Ok(data)
    }

    async fn do_write_target_sel(&mut self, ts: TargetSel) -> Result<(), SwdError> {
        let op = SwdOp::DpWrite(TargetSelRegister::ADDRESS);
        let cmd = op.to_cmd();
        trace!("exec {op}: cmd {cmd:#04x} {ts}");

        self.protocol.set_swdio_output();
        self.protocol.write_cmd_5_undriven(cmd);
        self.protocol.write_u32_parity(ts.data());
        self.protocol.set_swdio_low();
        self.protocol.clock(2);

        trace!("ok {op}");
        Ok(())
    }
}

impl<'a> DmiCallback for SwdDmiBridge<'a> {
    async fn dmi_write(&mut self, addr: u8, data: u32) {
        if let Err(e) = self.dmi_write_inner(addr, data).await {
            warn!("dmi write {addr:#04x} failed: {e}");
        }
    }

    async fn dmi_read(&mut self, addr: u8) -> u32 {
        match self.dmi_read_inner(addr).await {
            Ok(data) => data,
            Err(e) => {
                warn!("dmi read {addr:#04x} failed: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parity_matches_xor_of_variable_bits() {
        // AP read addr=0x2: APnDP=1, RnW=1, A2=0, A3=1, parity=(1^1^0^1)=1 -> 0xBF
        let op = SwdOp::ApRead(0x2);
        assert_eq!(op.to_cmd(), 0xBF);
    }

    #[test]
    fn dp_write_header_has_even_parity_for_zero_addr() {
        // DpWrite addr=0x0: APnDP=0, RnW=0, A2=0, A3=0, parity=0 -> 0x81
        let op = SwdOp::DpWrite(0x0);
        assert_eq!(op.to_cmd(), 0x81);
    }

    #[test]
    fn select_bank_bits_extracted_from_register_address() {
        let (bank, mask) = SwdOp::ApRead(0x1C).required_select_bits();
        assert_eq!(mask, Select::APBANKSEL_MASK << Select::APBANKSEL_SHIFT);
        assert_eq!(bank, 0x1 << Select::APBANKSEL_SHIFT);
    }

    #[test]
    fn dp_write_to_abort_select_rdbuff_never_needs_select_check() {
        assert!(!SwdOp::DpWrite(AbortRegister::ADDRESS).needs_select_check());
        assert!(!SwdOp::DpWrite(SelectRegister::ADDRESS).needs_select_check());
        assert!(!SwdOp::DpRead(RdBuffRegister::ADDRESS).needs_select_check());
        assert!(SwdOp::ApWrite(TarRegister::ADDRESS).needs_select_check());
    }

    #[test]
    fn tar_cache_counts_one_miss_per_unique_consecutive_address() {
        // write(0x4), write(0x4), write(0x5), write(0x4) -> 3 TAR writes.
        let mut cache = None;
        let mut tar_writes = 0;
        for addr in [0x4u8, 0x4, 0x5, 0x4] {
            if !tar_cache_hit(cache, addr) {
                tar_writes += 1;
                cache = Some((addr as u32) << 2);
            }
        }
        assert_eq!(tar_writes, 3);
    }

    #[test]
    fn tar_cache_starts_invalid_so_first_access_always_misses() {
        assert!(!tar_cache_hit(None, 0x0));
    }
}
