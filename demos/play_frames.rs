//! Frame playback pipeline
//!
//! Generates synthetic RGB frames, converts them to grayscale on a second
//! thread, and "displays" them (prints a summary line) on a third, with at
//! most `--capacity` frames in flight per queue.
//!
//! Usage: cargo run --example play_frames -- --source clip.mp4 --frames 72

use clap::Parser;
use conveyor::{FnConsumer, Pipeline, PipelineConfig, Producer};
use env_logger::Env;
use log::info;

#[derive(Parser, Debug)]
#[command(about = "Play synthetic video frames through a bounded pipeline")]
struct Args {
    /// Identifier of the frame source
    #[arg(short, long, default_value = "clip.mp4")]
    source: String,

    /// Number of frames to play
    #[arg(short, long, default_value_t = 72)]
    frames: u64,

    /// Maximum frames in flight per queue
    #[arg(short, long, default_value_t = 10)]
    capacity: usize,
}

/// One synthetic RGB frame
struct Frame {
    index: u64,
    pixels: Vec<u8>,
}

/// Stand-in for a video decoder: produces a deterministic RGB pattern
struct FrameGrabber {
    next_index: u64,
    width: usize,
    height: usize,
}

impl FrameGrabber {
    fn new(width: usize, height: usize) -> Self {
        Self {
            next_index: 0,
            width,
            height,
        }
    }
}

impl Producer for FrameGrabber {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let index = self.next_index;
        self.next_index += 1;

        let mut pixels = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push((x as u64 + index) as u8);
                pixels.push((y as u64 + index) as u8);
                pixels.push(index as u8);
            }
        }
        Some(Frame { index, pixels })
    }
}

/// Average each RGB triple down to a single luma byte
fn grayscale(frame: Frame) -> Frame {
    let pixels = frame
        .pixels
        .chunks_exact(3)
        .map(|rgb| ((rgb[0] as u16 + rgb[1] as u16 + rgb[2] as u16) / 3) as u8)
        .collect();
    Frame {
        index: frame.index,
        pixels,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = PipelineConfig::new(args.source)
        .with_capacity(args.capacity)
        .with_max_items(args.frames);

    let report = Pipeline::new(config)?.run(
        FrameGrabber::new(64, 48),
        grayscale,
        FnConsumer::new(|frame: Frame| {
            info!("displaying frame #{} ({} bytes)", frame.index, frame.pixels.len());
            true
        }),
    )?;

    print!("{}", report.format());
    Ok(())
}
