//! Register and buffer dumps for debugging a silent strip

use crate::hal::dma::{cs_bits, debug_bits, ti_bits, ControlBlock, DmaReg};
use crate::hal::pwm::{ctl_bits, dmac_bits, sta_bits, PwmReg};
use crate::hal::Peripherals;
use crate::waveform::{WaveformBuffer, BITS_PER_PIXEL, SYMBOL_BITS};
use std::fmt::{self, Write};

fn flag(word: u32, mask: u32) -> u8 {
    u8::from(word & mask != 0)
}

fn field(word: u32, shift: u32, mask: u32) -> u32 {
    (word >> shift) & mask
}

/// Point-in-time copy of the PWM and DMA registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub pwm_ctl: u32,
    pub pwm_sta: u32,
    pub pwm_dmac: u32,
    pub dma_cs: u32,
    pub dma_conblk_ad: u32,
    pub dma_ti: u32,
    pub dma_source_ad: u32,
    pub dma_dest_ad: u32,
    pub dma_txfr_len: u32,
    pub dma_stride: u32,
    pub dma_nextconbk: u32,
    pub dma_debug: u32,
}

impl RegisterSnapshot {
    pub fn capture(hw: &Peripherals) -> Self {
        Self {
            pwm_ctl: hw.pwm.read(PwmReg::Ctl),
            pwm_sta: hw.pwm.read(PwmReg::Sta),
            pwm_dmac: hw.pwm.read(PwmReg::Dmac),
            dma_cs: hw.dma.read(DmaReg::Cs),
            dma_conblk_ad: hw.dma.read(DmaReg::ConblkAd),
            dma_ti: hw.dma.read(DmaReg::Ti),
            dma_source_ad: hw.dma.read(DmaReg::SourceAd),
            dma_dest_ad: hw.dma.read(DmaReg::DestAd),
            dma_txfr_len: hw.dma.read(DmaReg::TxfrLen),
            dma_stride: hw.dma.read(DmaReg::Stride),
            dma_nextconbk: hw.dma.read(DmaReg::NextConbk),
            dma_debug: hw.dma.read(DmaReg::Debug),
        }
    }

    /// Whether the DMA engine has latched an error
    pub fn has_errors(&self) -> bool {
        self.dma_cs & cs_bits::ERROR != 0 || self.dma_debug & debug_bits::ERRORS != 0
    }
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sta = self.pwm_sta;
        writeln!(f, "PWM Status Register (0x{:08x})", sta)?;
        for (name, mask) in [
            ("FULL1", sta_bits::FULL1),
            ("EMPT1", sta_bits::EMPT1),
            ("WERR1", sta_bits::WERR1),
            ("RERR1", sta_bits::RERR1),
            ("GAPO1", sta_bits::GAPO1),
            ("BERR", sta_bits::BERR),
            ("STA1", sta_bits::STA1),
        ] {
            writeln!(f, "  {:>14}: {}", name, flag(sta, mask))?;
        }

        let ctl = self.pwm_ctl;
        writeln!(f, "PWM Control Register (0x{:08x})", ctl)?;
        for (name, mask) in [
            ("PWEN1", ctl_bits::PWEN1),
            ("MODE1", ctl_bits::MODE1),
            ("RPTL1", ctl_bits::RPTL1),
            ("SBIT1", ctl_bits::SBIT1),
            ("POLA1", ctl_bits::POLA1),
            ("USEF1", ctl_bits::USEF1),
            ("CLRF1", ctl_bits::CLRF1),
            ("MSEN1", ctl_bits::MSEN1),
        ] {
            writeln!(f, "  {:>14}: {}", name, flag(ctl, mask))?;
        }

        let dmac = self.pwm_dmac;
        writeln!(f, "PWM DMAC Register (0x{:08x})", dmac)?;
        writeln!(f, "  {:>14}: {}", "ENAB", flag(dmac, dmac_bits::ENAB))?;
        writeln!(f, "  {:>14}: {}", "PANIC", field(dmac, dmac_bits::PANIC_SHIFT, dmac_bits::THRESHOLD_MASK))?;
        writeln!(f, "  {:>14}: {}", "DREQ", field(dmac, dmac_bits::DREQ_SHIFT, dmac_bits::THRESHOLD_MASK))?;

        writeln!(f, "DMA Registers")?;
        for (name, value) in [
            ("CONBLK_AD", self.dma_conblk_ad),
            ("SOURCE_AD", self.dma_source_ad),
            ("DEST_AD", self.dma_dest_ad),
            ("TXFR_LEN", self.dma_txfr_len),
            ("NEXTCONBK", self.dma_nextconbk),
            ("STRIDE", self.dma_stride),
            ("TI", self.dma_ti),
            ("CS", self.dma_cs),
            ("DEBUG", self.dma_debug),
        ] {
            writeln!(f, "  {:>14}: 0x{:08x}", name, value)?;
        }

        let cs = self.dma_cs;
        writeln!(f, "DMA Control & Status (0x{:08x})", cs)?;
        for (name, mask) in [
            ("RESET", cs_bits::RESET),
            ("ABORT", cs_bits::ABORT),
            ("DISDEBUG", cs_bits::DISDEBUG),
        ] {
            writeln!(f, "  {:>14}: {}", name, flag(cs, mask))?;
        }
        writeln!(f, "  {:>14}: {}", "PANIC_PRI", field(cs, cs_bits::PANIC_PRIORITY_SHIFT, 0xF))?;
        writeln!(f, "  {:>14}: {}", "PRIORITY", field(cs, cs_bits::PRIORITY_SHIFT, 0xF))?;
        for (name, mask) in [
            ("ERROR", cs_bits::ERROR),
            ("WAITING_FOR", cs_bits::WAITING_FOR_OUTSTANDING_WRITES),
            ("DREQ_STOPS_DMA", cs_bits::DREQ_STOPS_DMA),
            ("PAUSED", cs_bits::PAUSED),
            ("DREQ", cs_bits::DREQ),
            ("INT", cs_bits::INT),
            ("END", cs_bits::END),
            ("ACTIVE", cs_bits::ACTIVE),
        ] {
            writeln!(f, "  {:>14}: {}", name, flag(cs, mask))?;
        }

        write_transfer_info(f, self.dma_ti)?;

        let dbg = self.dma_debug;
        writeln!(f, "DMA Debug Register (0x{:08x})", dbg)?;
        writeln!(f, "  {:>14}: {}", "LITE", flag(dbg, debug_bits::LITE))?;
        writeln!(f, "  {:>14}: {}", "VERSION", field(dbg, debug_bits::VERSION_SHIFT, 0x7))?;
        writeln!(f, "  {:>14}: {}", "DMA_STATE", field(dbg, debug_bits::DMA_STATE_SHIFT, 0x1FF))?;
        writeln!(f, "  {:>14}: {}", "DMA_ID", field(dbg, debug_bits::DMA_ID_SHIFT, 0xFF))?;
        writeln!(f, "  {:>14}: {}", "OUTSTANDING_W", field(dbg, debug_bits::OUTSTANDING_WRITES_SHIFT, 0xF))?;
        writeln!(f, "  {:>14}: {}", "READ_ERROR", flag(dbg, debug_bits::READ_ERROR))?;
        writeln!(f, "  {:>14}: {}", "FIFO_ERROR", flag(dbg, debug_bits::FIFO_ERROR))?;
        write!(f, "  {:>14}: {}", "READ_LAST_NS", flag(dbg, debug_bits::READ_LAST_NOT_SET_ERROR))
    }
}

fn write_transfer_info(out: &mut impl Write, ti: u32) -> fmt::Result {
    writeln!(out, "Transfer Information (0x{:08x})", ti)?;
    writeln!(out, "  {:>14}: {}", "NO_WIDE_BURSTS", flag(ti, ti_bits::NO_WIDE_BURSTS))?;
    writeln!(out, "  {:>14}: {}", "WAITS", field(ti, ti_bits::WAITS_SHIFT, 0x1F))?;
    writeln!(out, "  {:>14}: {}", "PERMAP", field(ti, ti_bits::PERMAP_SHIFT, 0x1F))?;
    writeln!(out, "  {:>14}: {}", "BURST_LENGTH", field(ti, ti_bits::BURST_LENGTH_SHIFT, 0xF))?;
    for (name, mask) in [
        ("SRC_IGNORE", ti_bits::SRC_IGNORE),
        ("SRC_DREQ", ti_bits::SRC_DREQ),
        ("SRC_WIDTH", ti_bits::SRC_WIDTH),
        ("SRC_INC", ti_bits::SRC_INC),
        ("DEST_IGNORE", ti_bits::DEST_IGNORE),
        ("DEST_DREQ", ti_bits::DEST_DREQ),
        ("DEST_WIDTH", ti_bits::DEST_WIDTH),
        ("DEST_INC", ti_bits::DEST_INC),
        ("WAIT_RESP", ti_bits::WAIT_RESP),
        ("TDMODE", ti_bits::TDMODE),
        ("INTEN", ti_bits::INTEN),
    ] {
        writeln!(out, "  {:>14}: {}", name, flag(ti, mask))?;
    }
    Ok(())
}

/// Control block fields followed by its decoded transfer information
pub fn describe_control_block(cb: &ControlBlock) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Control Block");
    for (name, value) in [
        ("TI", cb.info),
        ("SOURCE_AD", cb.source),
        ("DEST_AD", cb.destination),
        ("TXFR_LEN", cb.length),
        ("STRIDE", cb.stride),
        ("NEXTCONBK", cb.next),
        ("RES1", cb.reserved[0]),
        ("RES2", cb.reserved[1]),
    ] {
        let _ = writeln!(out, "  {:>14}: 0x{:08x}", name, value);
    }
    let _ = write_transfer_info(&mut out, cb.info);
    out
}

/// Waveform bits, one pixel per line
///
/// Symbols are separated by `:`, and every 24 bits by a space.
pub fn dump_waveform(waveform: &WaveformBuffer, pixels: usize) -> String {
    let bits = (pixels * BITS_PER_PIXEL).min(waveform.capacity() * 32);
    let mut out = String::with_capacity(bits * 2);
    for p in 0..bits {
        out.push(if waveform.bit(p) { '1' } else { '0' });
        if p % BITS_PER_PIXEL == BITS_PER_PIXEL - 1 {
            out.push('\n');
        } else if p % SYMBOL_BITS == SYMBOL_BITS - 1 {
            out.push(if p % 8 == 7 { ' ' } else { ':' });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::dma::CS_CONFIG;
    use crate::pixel::Color;

    #[test]
    fn test_snapshot_decodes_fields() {
        let mut hw = Peripherals::simulated().unwrap();
        hw.pwm.write(PwmReg::Ctl, ctl_bits::MODE1 | ctl_bits::USEF1);
        hw.pwm.enable_dma(8, 8);
        hw.dma.write(DmaReg::Cs, CS_CONFIG | cs_bits::ACTIVE);

        let snap = RegisterSnapshot::capture(&hw);
        assert_eq!(snap.pwm_dmac, 0x8000_0808);
        assert!(!snap.has_errors());

        let text = snap.to_string();
        assert!(text.contains("         MODE1: 1"));
        assert!(text.contains("         PWEN1: 0"));
        assert!(text.contains("         PANIC: 8"));
        assert!(text.contains("     PANIC_PRI: 8"));
        assert!(text.contains("        ACTIVE: 1"));
    }

    #[test]
    fn test_snapshot_reports_errors() {
        let mut hw = Peripherals::simulated().unwrap();
        hw.dma.write(DmaReg::Debug, debug_bits::FIFO_ERROR);
        assert!(RegisterSnapshot::capture(&hw).has_errors());
    }

    #[test]
    fn test_control_block_description() {
        let cb = ControlBlock::for_transfer(0x4000_1040, 0x7E20_C018, 1, 16);
        let text = describe_control_block(&cb);
        assert!(text.contains("       DEST_AD: 0x7e20c018"));
        assert!(text.contains("      TXFR_LEN: 0x00000010"));
        assert!(text.contains("        PERMAP: 5"));
        assert!(text.contains("     DEST_DREQ: 1"));
    }

    #[test]
    fn test_waveform_dump_layout() {
        let mut wf = WaveformBuffer::for_leds(2);
        wf.encode(&[Color::WHITE, Color::BLACK], 1.0);
        let dump = dump_waveform(&wf, 2);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("110:110:110:110:110:110:110:110 110:"));
        assert!(lines[1].starts_with("100:100:100:100:100:100:100:100 100:"));
        assert_eq!(lines[0].chars().filter(|c| *c == '1' || *c == '0').count(), 72);
    }
}
