//! Mock DNRGB LED controller for testing the ledcam streamer
//!
//! Usage: cargo run -p ledcam-mock-receiver
//! Then point ledcam at 127.0.0.1:21324

use std::net::UdpSocket;

use clap::Parser;
use ledcam_dnrgb::{DnrgbHeader, BYTES_PER_LED};

#[derive(Parser, Debug)]
#[command(name = "ledcam-mock-receiver")]
#[command(about = "Print what a DNRGB controller would display")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:21324")]
    bind: String,

    /// LEDs on the simulated strip
    #[arg(short, long, default_value = "1768")]
    leds: usize,

    /// Stop after this many datagrams
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

/// Simulated LED strip holding the last color written to each LED
struct LedStrip {
    leds: Vec<[u8; 3]>,
}

impl LedStrip {
    fn new(len: usize) -> Self {
        Self {
            leds: vec![[0; 3]; len],
        }
    }

    /// Write a payload starting at `start`; returns LEDs that fell off the end
    fn apply(&mut self, start: usize, payload: &[u8]) -> usize {
        let mut clipped = 0;
        for (offset, rgb) in payload.chunks_exact(BYTES_PER_LED).enumerate() {
            match self.leds.get_mut(start + offset) {
                Some(led) => led.copy_from_slice(rgb),
                None => clipped += 1,
            }
        }
        clipped
    }

    fn lit(&self) -> usize {
        self.leds.iter().filter(|led| **led != [0; 3]).count()
    }
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    println!("Mock DNRGB receiver starting on {}...", args.bind);
    let socket = UdpSocket::bind(&args.bind)?;
    println!("Mock DNRGB receiver ready - {} LEDs", args.leds);

    let mut strip = LedStrip::new(args.leds);
    let mut buf = [0u8; 2048];
    let mut received = 0u64;

    while args.count.map_or(true, |max| received < max) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Receive error: {e}");
                continue;
            }
        };
        received += 1;

        match DnrgbHeader::decode(&buf[..len]) {
            Ok((header, payload)) => {
                let start = usize::from(header.start_index());
                let clipped = strip.apply(start, payload);
                println!(
                    "RX from {peer}: start {start}, {} LEDs, wait {}, {} lit{}",
                    payload.len() / BYTES_PER_LED,
                    header.wait_time(),
                    strip.lit(),
                    if clipped > 0 {
                        format!(" ({clipped} past end of strip)")
                    } else {
                        String::new()
                    }
                );
            }
            Err(e) => eprintln!("Bad datagram from {peer} ({len} bytes): {e}"),
        }
    }

    println!("Received {received} datagrams, {} LEDs lit", strip.lit());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_at_offset() {
        let mut strip = LedStrip::new(4);
        let clipped = strip.apply(1, &[1, 2, 3, 0, 0, 0]);
        assert_eq!(clipped, 0);
        assert_eq!(strip.leds, [[0; 3], [1, 2, 3], [0; 3], [0; 3]]);
        assert_eq!(strip.lit(), 1);
    }

    #[test]
    fn test_apply_past_end() {
        let mut strip = LedStrip::new(2);
        let clipped = strip.apply(1, &[9; 9]);
        assert_eq!(clipped, 2);
        assert_eq!(strip.lit(), 1);
    }

    #[test]
    fn test_decoded_datagram() {
        let datagram = [4, 5, 0x00, 0x02, 10, 20, 30];
        let (header, payload) = DnrgbHeader::decode(&datagram).expect("valid");
        let mut strip = LedStrip::new(3);
        strip.apply(usize::from(header.start_index()), payload);
        assert_eq!(strip.leds[2], [10, 20, 30]);
    }
}
