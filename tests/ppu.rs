//! PPU timing and register behavior, driven dot by dot.

use std::cell::RefCell;
use std::rc::Rc;

use famicore::ppu::{NmiLine, Ppu};
use famicore::{Cartridge, FrameBufferSink};

/// A CHR-RAM cartridge with 1x16KB PRG, horizontal mirroring.
fn build_cartridge() -> Rc<RefCell<Cartridge>> {
    let mut rom = vec![0u8; 16];
    rom[0..4].copy_from_slice(b"NES\x1A");
    rom[4] = 1;
    rom.extend(std::iter::repeat(0u8).take(16 * 1024));
    Rc::new(RefCell::new(Cartridge::from_bytes(&rom).unwrap()))
}

fn build_ppu() -> (Ppu, NmiLine, Rc<RefCell<FrameBufferSink>>) {
    let nmi = NmiLine::new();
    let sink = Rc::new(RefCell::new(FrameBufferSink::new()));
    let ppu = Ppu::new(build_cartridge(), nmi.clone(), Box::new(Rc::clone(&sink)));
    (ppu, nmi, sink)
}

/// Advance dot by dot until the PPU sits at (scanline, dot).
fn run_to(ppu: &mut Ppu, scanline: i32, dot: i32) {
    for _ in 0..200_000 {
        if ppu.scan_position() == (scanline, dot) {
            return;
        }
        ppu.execute_cycles(1);
    }
    panic!("never reached ({}, {}), at {:?}", scanline, dot, ppu.scan_position());
}

/// Two-write helper for the VRAM address register.
fn set_vram_address(ppu: &mut Ppu, address: u16) {
    ppu.write_register(6, (address >> 8) as u8);
    ppu.write_register(6, (address & 0xFF) as u8);
}

#[test]
fn dots_elapse_one_per_cycle() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.execute_cycles(1);
    assert_eq!(ppu.scan_position(), (0, 0));

    ppu.execute_cycles(341);
    assert_eq!(ppu.scan_position(), (1, 0));

    ppu.execute_cycles(340);
    assert_eq!(ppu.scan_position(), (1, 340));

    ppu.execute_cycles(1);
    assert_eq!(ppu.scan_position(), (2, 0));

    // With rendering disabled every frame is exactly 262 * 341 dots
    ppu.execute_cycles(260 * 341);
    assert_eq!(ppu.scan_position(), (0, 0));
}

#[test]
fn vblank_flag_rises_and_nmi_fires_two_dots_later() {
    let (mut ppu, nmi, _sink) = build_ppu();
    ppu.write_register(0, 0x80); // NMI on VBlank

    ppu.execute_cycles(2); // Dots 0 and 1
    assert!(!nmi.take());

    ppu.execute_cycles(1); // Dot 2
    assert!(nmi.take());

    // Exactly one NMI per frame while the flag is never read
    let mut count = 0;
    for _ in 0..(262 * 341) {
        ppu.execute_cycles(1);
        if nmi.take() {
            count += 1;
        }
    }
    assert_eq!(count, 1);
}

#[test]
fn status_read_on_dot_before_vbl_suppresses_flag_and_nmi() {
    let (mut ppu, nmi, _sink) = build_ppu();
    ppu.write_register(0, 0x80);

    run_to(&mut ppu, 261, 340); // Last dot before the flag rises
    nmi.take(); // Drop the NMI from the frame just finished
    ppu.read_register(2);

    ppu.execute_cycles(3); // Would be flag set + NMI
    assert!(!nmi.take());
    assert_eq!(ppu.read_register(2) & 0x80, 0);
}

#[test]
fn status_read_at_vbl_set_dot_kills_nmi_but_returns_flag() {
    let (mut ppu, nmi, _sink) = build_ppu();
    ppu.write_register(0, 0x80);

    ppu.execute_cycles(1); // (0, 0): flag just set
    let status = ppu.read_register(2);
    assert_ne!(status & 0x80, 0);

    ppu.execute_cycles(2); // Through dot 2
    assert!(!nmi.take());
}

#[test]
fn enabling_nmi_inside_vblank_fires_immediately() {
    let (mut ppu, nmi, _sink) = build_ppu();

    ppu.execute_cycles(1); // Flag set
    assert!(!nmi.take());

    ppu.write_register(0, 0x80);
    assert!(nmi.take());

    // Re-writing the same value does not fire again
    ppu.write_register(0, 0x80);
    assert!(!nmi.take());
}

#[test]
fn vblank_flag_clears_on_pre_render_scanline() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.execute_cycles(1);
    run_to(&mut ppu, 20, 0);

    assert_eq!(ppu.read_register(2) & 0x80, 0);
}

#[test]
fn status_read_clears_vblank_flag() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.execute_cycles(1);
    assert_ne!(ppu.read_register(2) & 0x80, 0);
    assert_eq!(ppu.read_register(2) & 0x80, 0);
}

#[test]
fn palette_backdrop_entries_alias() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    set_vram_address(&mut ppu, 0x3F10);
    ppu.write_register(7, 0xAB);
    set_vram_address(&mut ppu, 0x3F00);
    assert_eq!(ppu.read_register(7), 0xAB); // Palette reads are immediate

    set_vram_address(&mut ppu, 0x3F04);
    ppu.write_register(7, 0xCD);
    set_vram_address(&mut ppu, 0x3F14);
    assert_eq!(ppu.read_register(7), 0xCD);
}

#[test]
fn vram_reads_below_palettes_are_buffered() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    set_vram_address(&mut ppu, 0x2005);
    ppu.write_register(7, 0x5A);

    set_vram_address(&mut ppu, 0x2005);
    let stale = ppu.read_register(7);
    assert_eq!(stale, 0x00); // Buffer primed before the address was set
    assert_eq!(ppu.read_register(7), 0x5A);
}

#[test]
fn vram_address_increments_by_32_when_selected() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.write_register(0, 0x04); // Increment 32
    set_vram_address(&mut ppu, 0x2000);
    ppu.write_register(7, 0x11);
    ppu.write_register(7, 0x22);

    ppu.write_register(0, 0x00); // Back to increment 1
    set_vram_address(&mut ppu, 0x2020);
    ppu.read_register(7); // Prime the buffer
    assert_eq!(ppu.read_register(7), 0x22);
}

#[test]
fn status_read_resets_the_shared_write_toggle() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.write_register(6, 0x21); // Dangling first write
    ppu.read_register(2); // Toggle resets

    set_vram_address(&mut ppu, 0x3F00);
    ppu.write_register(7, 0x2A);
    set_vram_address(&mut ppu, 0x3F00);
    assert_eq!(ppu.read_register(7), 0x2A);
}

#[test]
fn oam_data_writes_post_increment_reads_do_not() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.write_register(3, 0x10);
    ppu.write_register(4, 0xAA);
    ppu.write_register(4, 0xBB);

    ppu.write_register(3, 0x10);
    assert_eq!(ppu.read_register(4), 0xAA);
    assert_eq!(ppu.read_register(4), 0xAA); // Reads leave the address alone

    ppu.write_register(3, 0x11);
    assert_eq!(ppu.read_register(4), 0xBB);
}

#[test]
fn ninth_sprite_on_a_scanline_sets_overflow() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    // Nine sprites all covering the first rendered scanlines
    ppu.write_register(3, 0x00);
    for i in 0..9u8 {
        ppu.write_register(4, 0); // Y
        ppu.write_register(4, 0); // Tile
        ppu.write_register(4, 0); // Attributes
        ppu.write_register(4, i * 8); // X
    }

    ppu.write_register(1, 0x18); // Enable rendering
    run_to(&mut ppu, 21, 64);

    assert_ne!(ppu.read_register(2) & 0x20, 0);
}

#[test]
fn sprite_overflow_clear_with_eight_sprites() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    ppu.write_register(3, 0x00);
    for i in 0..8u8 {
        ppu.write_register(4, 0);
        ppu.write_register(4, 0);
        ppu.write_register(4, 0);
        ppu.write_register(4, i * 8);
    }

    ppu.write_register(1, 0x18);
    run_to(&mut ppu, 21, 64);

    assert_eq!(ppu.read_register(2) & 0x20, 0);
}

#[test]
fn sprite_zero_hit_on_overlapping_solid_pixels() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    // Solid tile 0: low plane all ones (CHR RAM)
    set_vram_address(&mut ppu, 0x0000);
    for _ in 0..8 {
        ppu.write_register(7, 0xFF);
    }

    // Sprite 0 at the top-left corner, tile 0
    ppu.write_register(3, 0x00);
    for byte in [0u8, 0, 0, 0] {
        ppu.write_register(4, byte);
    }

    // Background and sprites visible, no left-column clipping
    ppu.write_register(1, 0x1E);

    run_to(&mut ppu, 30, 0);
    assert_ne!(ppu.read_register(2) & 0x40, 0);
}

#[test]
fn sprite_zero_hit_clears_on_pre_render() {
    let (mut ppu, _nmi, _sink) = build_ppu();

    set_vram_address(&mut ppu, 0x0000);
    for _ in 0..8 {
        ppu.write_register(7, 0xFF);
    }
    ppu.write_register(3, 0x00);
    for byte in [0u8, 0, 0, 0] {
        ppu.write_register(4, byte);
    }
    ppu.write_register(1, 0x1E);

    run_to(&mut ppu, 30, 0);
    assert_ne!(ppu.read_register(2) & 0x40, 0);

    run_to(&mut ppu, 20, 1);
    assert_eq!(ppu.read_register(2) & 0x40, 0);
}

#[test]
fn odd_frames_shorten_the_pre_render_scanline_with_bg_enabled() {
    // Background on: the first (odd) frame's pre-render line is 340 dots
    let (mut ppu, _nmi, _sink) = build_ppu();
    ppu.write_register(1, 0x08);

    run_to(&mut ppu, 20, 0);
    ppu.execute_cycles(340);
    assert_eq!(ppu.scan_position(), (21, 0));

    // Background off: full 341 dots
    let (mut ppu, _nmi, _sink) = build_ppu();
    run_to(&mut ppu, 20, 0);
    ppu.execute_cycles(340);
    assert_eq!(ppu.scan_position(), (20, 340));
}

#[test]
fn one_frame_is_delivered_per_vblank() {
    let (mut ppu, _nmi, sink) = build_ppu();

    ppu.execute_cycles(262 * 341);
    assert_eq!(sink.borrow().frames_received(), 1);

    ppu.execute_cycles(262 * 341);
    assert_eq!(sink.borrow().frames_received(), 2);
}

#[test]
fn disabled_rendering_paints_the_backdrop_color() {
    let (mut ppu, _nmi, sink) = build_ppu();

    // Backdrop entry: color index 0x21 (a light blue in the master palette)
    set_vram_address(&mut ppu, 0x3F00);
    ppu.write_register(7, 0x21);

    ppu.execute_cycles(262 * 341);

    let frame = sink.borrow();
    let expected = 0x3CBCFC; // PALETTE_RGB[0x21]
    assert!(frame.frame().iter().all(|&px| px == expected));
}
