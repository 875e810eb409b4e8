use super::GazeSource;
use crate::clock::MonotonicClock;
use crate::types::GazeSample;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

#[derive(Debug, Clone, Deserialize)]
struct JsonGazeMsg {
    #[serde(default)]
    h: Option<f64>,
    #[serde(default)]
    v: Option<f64>,
    #[serde(default)]
    valid: Option<bool>,
}

pub fn udp_gaze_addr_from_env() -> Option<SocketAddr> {
    let raw = std::env::var("RAYOS_GAZE_UDP_ADDR").ok()?;
    raw.parse::<SocketAddr>().ok()
}

/// Parse one tracker datagram. Ratios are clamped to [0, 1]; `valid`
/// defaults to whether both ratios are present.
pub fn parse_gaze_message(msg: &str, timestamp: f64) -> Option<GazeSample> {
    let msg = msg.trim();
    if msg.is_empty() {
        return None;
    }

    // JSON: {"h":0.5,"v":0.5,"valid":true}
    if msg.starts_with('{') {
        let j = serde_json::from_str::<JsonGazeMsg>(msg).ok()?;
        return Some(build(j.h, j.v, j.valid, timestamp));
    }

    // k=v tokens: h=0.5 v=0.5 valid=1
    let mut h: Option<f64> = None;
    let mut v: Option<f64> = None;
    let mut valid: Option<bool> = None;

    for tok in msg.split_whitespace() {
        let (k, val) = tok.split_once('=')?;
        match k {
            "h" | "horizontal" => h = val.parse().ok(),
            "v" | "vertical" => v = val.parse().ok(),
            "valid" => {
                valid = match val {
                    "1" | "true" => Some(true),
                    "0" | "false" => Some(false),
                    _ => None,
                }
            }
            _ => {}
        }
    }

    if h.is_none() && v.is_none() && valid.is_none() {
        return None;
    }
    Some(build(h, v, valid, timestamp))
}

fn build(h: Option<f64>, v: Option<f64>, valid: Option<bool>, timestamp: f64) -> GazeSample {
    let h = h.filter(|x| x.is_finite()).map(|x| x.clamp(0.0, 1.0));
    let v = v.filter(|x| x.is_finite()).map(|x| x.clamp(0.0, 1.0));
    GazeSample {
        horizontal_ratio: h,
        vertical_ratio: v,
        valid: valid.unwrap_or(h.is_some() && v.is_some()),
        timestamp,
    }
}

/// Gaze samples pushed by an external tracker over UDP
pub struct UdpGazeSource {
    sock: UdpSocket,
    clock: MonotonicClock,
    buf: Vec<u8>,
}

impl UdpGazeSource {
    pub async fn bind(addr: SocketAddr, clock: MonotonicClock) -> Result<Self> {
        let sock = UdpSocket::bind(addr).await?;
        log::info!("UDP gaze listener bound on {}", sock.local_addr()?);
        Ok(Self {
            sock,
            clock,
            buf: vec![0u8; 2048],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }
}

#[async_trait]
impl GazeSource for UdpGazeSource {
    async fn next_sample(&mut self) -> Result<Option<GazeSample>> {
        loop {
            let (len, src) = match self.sock.recv_from(&mut self.buf).await {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("UDP gaze recv error: {e}");
                    continue;
                }
            };

            let now = self.clock.now();
            let parsed = std::str::from_utf8(&self.buf[..len])
                .ok()
                .and_then(|s| parse_gaze_message(s, now));
            match parsed {
                Some(sample) => return Ok(Some(sample)),
                None => log::debug!("Ignoring malformed gaze datagram from {src}"),
            }
        }
    }
}
