//! Replay the nestest CPU verification ROM against its reference log.
//!
//! The ROM and log are not checked in; drop `nestest.nes` and `nestest.log`
//! into `tests/roms/` to enable the comparison. Without them the test is a
//! no-op.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use famicore::{FrameBufferSink, Nes};

struct LogEntry {
    pc: u16,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    sp: u8,
    /// Dot-in-scanline from old-format logs (`CYC:` + `SL:` columns)
    dot: Option<u32>,
}

fn parse_hex_field(line: &str, prefix: &str) -> Option<u8> {
    let start = line.find(prefix)? + prefix.len();
    u8::from_str_radix(line.get(start..start + 2)?, 16).ok()
}

fn parse_line(line: &str) -> Option<LogEntry> {
    let pc = u16::from_str_radix(line.get(0..4)?, 16).ok()?;

    let dot = if line.contains("SL:") {
        let start = line.find("CYC:")? + 4;
        let end = line.find("SL:")?;
        line.get(start..end)?.trim().parse::<u32>().ok()
    } else {
        None
    };

    Some(LogEntry {
        pc,
        a: parse_hex_field(line, "A:")?,
        x: parse_hex_field(line, "X:")?,
        y: parse_hex_field(line, "Y:")?,
        p: parse_hex_field(line, "P:")?,
        sp: parse_hex_field(line, "SP:")?,
        dot,
    })
}

fn rom_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/roms")
}

#[test]
fn nestest_log_replay() {
    let rom_path = rom_dir().join("nestest.nes");
    let log_path = rom_dir().join("nestest.log");
    if !rom_path.exists() || !log_path.exists() {
        eprintln!("nestest.nes/nestest.log not present, skipping");
        return;
    }

    let rom = std::fs::read(&rom_path).unwrap();
    let log = std::fs::read_to_string(&log_path).unwrap();

    let sink = Rc::new(RefCell::new(FrameBufferSink::new()));
    let mut nes = Nes::new(&rom, Box::new(Rc::clone(&sink))).unwrap();
    nes.start();

    // The automated entry point used by the reference log
    let cpu = nes.cpu_mut();
    cpu.a = 0x00;
    cpu.x = 0x00;
    cpu.y = 0x00;
    cpu.s = 0xFD;
    cpu.p = 0x24;
    cpu.pc = 0xC000;
    cpu.op_cycles = 0;

    let mut dot_accumulator: u32 = 0;

    for (number, line) in log.lines().enumerate() {
        let entry = match parse_line(line) {
            Some(entry) => entry,
            None => continue,
        };

        let cpu = nes.cpu();
        assert_eq!(cpu.pc, entry.pc, "PC mismatch at log line {}", number + 1);
        assert_eq!(cpu.a, entry.a, "A mismatch at log line {}", number + 1);
        assert_eq!(cpu.x, entry.x, "X mismatch at log line {}", number + 1);
        assert_eq!(cpu.y, entry.y, "Y mismatch at log line {}", number + 1);
        assert_eq!(cpu.p, entry.p, "P mismatch at log line {}", number + 1);
        assert_eq!(cpu.s, entry.sp, "SP mismatch at log line {}", number + 1);

        dot_accumulator = (dot_accumulator + nes.cpu().op_cycles * 3) % 341;
        if let Some(dot) = entry.dot {
            assert_eq!(dot_accumulator, dot, "dot mismatch at log line {}", number + 1);
        }

        nes.step();
    }
}
