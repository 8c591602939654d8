//! Synthetic frame source (`stub://`).
//!
//! Produces a flat, slightly graded belt background. Once per cycle a
//! textured red "produce" patch slides across the belt for a stretch of
//! frames, occasionally carrying a dark blemish. This exercises every gate
//! (empty scene, baseline change, motion, stable class) without a camera.

use std::time::Instant;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{frame_interval, FrameSource, SourceSettings, SourceStats};
use crate::frame::{Frame, MAX_FRAME_DIM};

/// Frames per cycle: the belt is empty for the first half, the patch
/// crosses during the second.
const CYCLE_FRAMES: u64 = 60;
const EMPTY_FRAMES: u64 = 30;
/// Checker cell edge, in pixels.
const CELL: u32 = 8;
const PATCH_LIGHT: [u8; 3] = [250, 40, 40];
const PATCH_DARK: [u8; 3] = [140, 10, 10];
const BLEMISH: [u8; 3] = [25, 20, 20];

pub struct SyntheticSource {
    settings: SourceSettings,
    rng: StdRng,
    background: Vec<u8>,
    frame_count: u64,
    connected: bool,
    last_frame_at: Option<Instant>,
    patch: PatchLayout,
}

#[derive(Clone, Copy, Debug)]
struct PatchLayout {
    top: u32,
    blemished: bool,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(settings: SourceSettings, seed: u64) -> Result<Self> {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: SourceSettings, rng: StdRng) -> Result<Self> {
        if settings.width < 16 || settings.height < 16 {
            bail!(
                "synthetic frames must be at least 16x16, got {}x{}",
                settings.width,
                settings.height
            );
        }
        if settings.width > MAX_FRAME_DIM || settings.height > MAX_FRAME_DIM {
            bail!(
                "synthetic frame {}x{} exceeds {}",
                settings.width,
                settings.height,
                MAX_FRAME_DIM
            );
        }
        let background = belt_background(settings.width, settings.height);
        Ok(Self {
            settings,
            rng,
            background,
            frame_count: 0,
            connected: false,
            last_frame_at: None,
            patch: PatchLayout {
                top: 0,
                blemished: false,
            },
        })
    }

    fn patch_size(&self) -> (u32, u32) {
        (self.settings.width / 4, self.settings.height / 3)
    }

    fn roll_patch(&mut self) {
        let (_, patch_h) = self.patch_size();
        let max_top = self.settings.height - patch_h;
        self.patch = PatchLayout {
            top: self.rng.gen_range(0..=max_top),
            blemished: self.rng.gen_bool(0.25),
        };
    }

    fn render(&mut self, phase: u64) -> Vec<u8> {
        let mut pixels = self.background.clone();
        if phase < EMPTY_FRAMES {
            return pixels;
        }
        if phase == EMPTY_FRAMES {
            self.roll_patch();
        }

        let width = self.settings.width;
        let (patch_w, patch_h) = self.patch_size();
        let travel = width - patch_w;
        let steps = (CYCLE_FRAMES - EMPTY_FRAMES - 1).max(1);
        let left = (travel as u64 * (phase - EMPTY_FRAMES) / steps) as u32;
        let top = self.patch.top;

        let blemish_w = patch_w / 3;
        let blemish_h = patch_h / 3;
        for y in 0..patch_h {
            for x in 0..patch_w {
                let rgb = if self.patch.blemished
                    && (blemish_w..2 * blemish_w).contains(&x)
                    && (blemish_h..2 * blemish_h).contains(&y)
                {
                    BLEMISH
                } else if ((x / CELL) + (y / CELL)) % 2 == 0 {
                    PATCH_LIGHT
                } else {
                    PATCH_DARK
                };
                let idx = (((top + y) * width + left + x) * 3) as usize;
                pixels[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
        pixels
    }

    fn pace(&mut self) {
        let interval = frame_interval(self.settings.target_fps);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

/// Vertical grey gradient, 80 at the top to 90 at the bottom.
fn belt_background(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        let shade = 80 + (y * 10 / height.max(1)) as u8;
        for _ in 0..width {
            pixels.extend_from_slice(&[shade, shade, shade]);
        }
    }
    pixels
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.settings.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            bail!("synthetic source not connected; call connect() first");
        }
        self.pace();
        let phase = self.frame_count % CYCLE_FRAMES;
        self.frame_count += 1;
        let pixels = self.render(phase);
        Frame::from_rgb(pixels, self.settings.width, self.settings.height)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.settings.url.clone(),
        }
    }
}
