use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::qmp::Monitor;

/// Guest-to-host address translation.
///
/// Split out as a trait so the memory layer can be tested without a live
/// monitor socket.
pub trait Translate {
    /// Resolve a guest virtual address to a host virtual address.
    fn translate(&mut self, guest: u64) -> Result<u64>;

    /// Read guest memory through the monitor. Slow; only used before the
    /// host mapping of a region is known.
    fn read_guest(&mut self, guest: u64, len: usize) -> Result<Vec<u8>>;

    /// Recover from a channel fault by re-establishing the underlying
    /// transport.
    fn reconnect(&mut self) -> Result<()>;
}

/// Rate-limited translator over the monitor channel.
///
/// Translation is a two-step query: guest virtual -> guest physical
/// (`gva2gpa`), then guest physical -> host virtual (`gpa2hva`). Both are
/// synchronous monitor round trips, so the per-request spacing here is what
/// keeps a cache-miss storm from starving the emulator's monitor loop.
pub struct AddressTranslator<M> {
    monitor: M,
    min_interval: Duration,
    last_request: Instant,
    warn_threshold: u32,
    window_count: u32,
    window_start: Instant,
}

impl<M: Monitor> AddressTranslator<M> {
    pub fn new(monitor: M, config: &MonitorConfig) -> Self {
        let now = Instant::now();
        Self {
            monitor,
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: now.checked_sub(Duration::from_secs(1)).unwrap_or(now),
            warn_threshold: config.request_rate_warn_threshold,
            window_count: 0,
            window_start: now,
        }
    }

    /// Delay the next request until the minimum spacing has elapsed, and
    /// keep the rolling throughput counter. Diagnostic only; a high rate
    /// means the caches upstream are missing more than they should.
    fn throttle(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            thread::sleep(self.min_interval - elapsed);
        }
        self.last_request = Instant::now();

        self.window_count += 1;
        if self.window_start.elapsed() >= Duration::from_secs(1) {
            if self.window_count > self.warn_threshold {
                warn!(
                    "{} monitor requests in the last second (threshold {})",
                    self.window_count, self.warn_threshold
                );
            }
            self.window_count = 0;
            self.window_start = Instant::now();
        }
    }

    fn hmp(&mut self, command: &str) -> Result<String> {
        self.throttle();
        self.monitor.hmp(command)
    }

    /// Guest virtual -> guest physical.
    pub fn virt_to_phys(&mut self, guest: u64) -> Result<u64> {
        let reply = self.hmp(&format!("gva2gpa {:#x}", guest))?;
        parse_gpa(&reply).ok_or_else(|| {
            if reply.contains("Unmapped") {
                Error::Unmapped { guest }
            } else {
                Error::Protocol(format!("bad gva2gpa reply for {:#x}: {:?}", guest, reply))
            }
        })
    }

    /// Guest physical -> host virtual.
    pub fn phys_to_host(&mut self, phys: u64) -> Result<u64> {
        let reply = self.hmp(&format!("gpa2hva {:#x}", phys))?;
        parse_hva(&reply)
            .ok_or_else(|| Error::Protocol(format!("bad gpa2hva reply for {:#x}: {:?}", phys, reply)))
    }

    pub fn pause(&mut self) -> Result<()> {
        self.throttle();
        self.monitor.execute("stop")?;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.throttle();
        self.monitor.execute("cont")?;
        Ok(())
    }

    pub fn is_paused(&mut self) -> Result<bool> {
        self.throttle();
        let reply = self.monitor.execute("query-status")?;
        Ok(reply.get("status").and_then(|s| s.as_str()) == Some("paused"))
    }

}

impl<M: Monitor> Translate for AddressTranslator<M> {
    fn translate(&mut self, guest: u64) -> Result<u64> {
        let phys = self.virt_to_phys(guest)?;
        let host = self.phys_to_host(phys)?;
        debug!("Translated guest {:#x} -> host {:#x}", guest, host);
        Ok(host)
    }

    fn read_guest(&mut self, guest: u64, len: usize) -> Result<Vec<u8>> {
        let reply = self.hmp(&format!("x /{}xb {:#x}", len, guest))?;
        if reply.contains("Cannot access memory") {
            return Err(Error::Unmapped { guest });
        }
        let bytes = parse_examine_bytes(&reply)?;
        if bytes.len() != len {
            return Err(Error::Protocol(format!(
                "short examine reply for {:#x}: wanted {} bytes, got {}",
                guest,
                len,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn reconnect(&mut self) -> Result<()> {
        self.monitor.reconnect()
    }
}

/// Pull the physical address out of a `gva2gpa` reply
/// (`gpa: 0xADDR` somewhere in the body).
fn parse_gpa(reply: &str) -> Option<u64> {
    let token = reply.split("gpa: ").nth(1)?.split_whitespace().next()?;
    parse_hex(token)
}

/// Pull the host address out of a `gpa2hva` reply
/// (`... is 0xADDR`).
fn parse_hva(reply: &str) -> Option<u64> {
    let token = reply.split(" is ").nth(1)?.split_whitespace().next()?;
    parse_hex(token)
}

/// Decode the byte dump produced by the monitor's `x /Nxb` command. Each
/// line is `ADDR: 0xAA 0xBB ...`.
fn parse_examine_bytes(reply: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for line in reply.lines() {
        let Some((_, data)) = line.split_once(": ") else {
            continue;
        };
        for token in data.split_whitespace() {
            let value = u8::from_str_radix(token.trim_start_matches("0x"), 16)
                .map_err(|e| Error::Protocol(format!("bad examine token '{}': {}", token, e)))?;
            bytes.push(value);
        }
    }
    Ok(bytes)
}

fn parse_hex(token: &str) -> Option<u64> {
    u64::from_str_radix(token.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    /// Monitor stub replaying canned replies in order.
    struct FakeMonitor {
        replies: Vec<String>,
        commands: Vec<String>,
    }

    impl FakeMonitor {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().rev().map(|s| s.to_string()).collect(),
                commands: Vec::new(),
            }
        }
    }

    impl Monitor for FakeMonitor {
        fn execute(&mut self, command: &str) -> Result<Value> {
            self.commands.push(command.to_string());
            Ok(json!({"status": "paused"}))
        }

        fn hmp(&mut self, command: &str) -> Result<String> {
            self.commands.push(command.to_string());
            self.replies.pop().ok_or(Error::Disconnected)
        }

        fn reconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            min_request_interval_ms: 0,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn test_parse_gpa() {
        assert_eq!(parse_gpa("gpa: 0x3c5d14\n"), Some(0x3c5d14));
        assert_eq!(parse_gpa("Unmapped\n"), None);
    }

    #[test]
    fn test_parse_hva() {
        assert_eq!(
            parse_hva("Host virtual address for 0x3c5d14 (xbox.ram) is 0x7f2a1c3c5d14\n"),
            Some(0x7f2a_1c3c_5d14)
        );
    }

    #[test]
    fn test_parse_examine_bytes() {
        let reply = "0000000000002d14: 0x12 0x34 0x56 0x78\n0000000000002d18: 0x9a 0xbc\n";
        let bytes = parse_examine_bytes(reply).unwrap();
        assert_eq!(bytes, vec![0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]);
    }

    #[test]
    fn test_translate_two_step() {
        let monitor = FakeMonitor::new(&[
            "gpa: 0x1d14\n",
            "Host virtual address for 0x1d14 (xbox.ram) is 0x7f0000001d14\n",
        ]);
        let mut translator = AddressTranslator::new(monitor, &test_config());
        let host = translator.translate(0x8000_1d14).unwrap();
        assert_eq!(host, 0x7f00_0000_1d14);
    }

    #[test]
    fn test_translate_unmapped() {
        let monitor = FakeMonitor::new(&["Unmapped\n"]);
        let mut translator = AddressTranslator::new(monitor, &test_config());
        let err = translator.translate(0xdead_0000).unwrap_err();
        assert!(matches!(err, Error::Unmapped { guest: 0xdead_0000 }));
    }

    #[test]
    fn test_read_guest_short_reply_is_error() {
        let monitor = FakeMonitor::new(&["0000000000001000: 0x01 0x02\n"]);
        let mut translator = AddressTranslator::new(monitor, &test_config());
        assert!(translator.read_guest(0x1000, 4).is_err());
    }

    #[test]
    fn test_pause_resume_status() {
        let monitor = FakeMonitor::new(&[]);
        let mut translator = AddressTranslator::new(monitor, &test_config());
        translator.pause().unwrap();
        assert!(translator.is_paused().unwrap());
        translator.resume().unwrap();
        assert_eq!(
            translator.monitor.commands,
            vec!["stop", "query-status", "cont"]
        );
    }

    #[test]
    fn test_rate_limit_spacing() {
        let monitor = FakeMonitor::new(&["gpa: 0x0\n", "gpa: 0x0\n", "gpa: 0x0\n"]);
        let config = MonitorConfig {
            min_request_interval_ms: 5,
            ..MonitorConfig::default()
        };
        let mut translator = AddressTranslator::new(monitor, &config);
        let start = Instant::now();
        for _ in 0..3 {
            let _ = translator.virt_to_phys(0x1000);
        }
        // Three requests, two enforced gaps.
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
