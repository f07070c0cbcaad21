//! Video output
//!
//! The PPU hands one completed 256x240 frame of 0x00RRGGBB values to a
//! `VideoSink` per VBlank. Sinks must copy what they need; the buffer is
//! reused for the next frame.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Receives one frame per VBlank, synchronously.
pub trait VideoSink {
    fn receive_frame(&mut self, frame: &[u32]);
}

/// Shared-ownership adapter so a sink can be observed from outside the
/// console while it is plugged into the PPU.
impl<T: VideoSink> VideoSink for Rc<RefCell<T>> {
    fn receive_frame(&mut self, frame: &[u32]) {
        self.borrow_mut().receive_frame(frame);
    }
}

/// A sink retaining the most recent frame, with a PPM (P6) encoder for
/// screenshots.
pub struct FrameBufferSink {
    frame: Vec<u32>,
    frames_received: u64,
}

impl Default for FrameBufferSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBufferSink {
    pub fn new() -> Self {
        FrameBufferSink {
            frame: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frames_received: 0,
        }
    }

    /// The latest frame, 0x00RRGGBB row-major
    pub fn frame(&self) -> &[u32] {
        &self.frame
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Encode the retained frame as a binary PPM image.
    pub fn write_ppm<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P6 {} {} 255\n", SCREEN_WIDTH, SCREEN_HEIGHT)?;

        for rgb in &self.frame {
            let bytes = [(rgb >> 16) as u8, (rgb >> 8) as u8, *rgb as u8];
            out.write_all(&bytes)?;
        }

        Ok(())
    }
}

impl VideoSink for FrameBufferSink {
    fn receive_frame(&mut self, frame: &[u32]) {
        self.frame.copy_from_slice(frame);
        self.frames_received += 1;
    }
}
