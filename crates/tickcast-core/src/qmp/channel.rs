use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};

/// Request/response transport to the emulator monitor.
///
/// Abstracted as a trait so the translator can be exercised against canned
/// replies in tests.
pub trait Monitor {
    /// Run a monitor command with no arguments and return its reply payload.
    fn execute(&mut self, command: &str) -> Result<Value>;

    /// Run a human-monitor command line and return its raw reply text.
    fn hmp(&mut self, command: &str) -> Result<String>;

    /// Tear down and re-establish the transport after a channel fault.
    fn reconnect(&mut self) -> Result<()>;
}

/// Blocking QMP client over TCP.
///
/// A request that times out leaves the stream in an unknown state (the reply
/// may still arrive later and would be attributed to the next request), so
/// the caller must drop the channel and reconnect rather than reuse it.
pub struct QmpChannel {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    config: MonitorConfig,
}

impl QmpChannel {
    /// Connect and negotiate capabilities, retrying within the configured
    /// bounds. Fails permanently once the attempts are exhausted.
    pub fn connect(config: &MonitorConfig) -> Result<Self> {
        let mut attempt = 0u32;
        loop {
            match Self::connect_once(config) {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    attempt += 1;
                    if attempt > config.reconnect_attempts {
                        return Err(e);
                    }
                    warn!(
                        "Monitor connect failed ({}), retrying (attempt {}/{})",
                        e, attempt, config.reconnect_attempts
                    );
                    thread::sleep(Duration::from_millis(config.reconnect_delay_ms));
                }
            }
        }
    }

    fn connect_once(config: &MonitorConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr)
            .map_err(|e| Error::Protocol(format!("connect to {} failed: {}", addr, e)))?;
        stream.set_read_timeout(Some(Duration::from_millis(config.timeout_ms)))?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        let mut channel = Self {
            stream,
            reader,
            config: config.clone(),
        };

        // The monitor greets with a `QMP` object before accepting commands.
        let greeting = channel.read_message()?;
        if greeting.get("QMP").is_none() {
            return Err(Error::Protocol(format!(
                "unexpected monitor greeting: {}",
                greeting
            )));
        }
        channel.send(&json!({"execute": "qmp_capabilities", "arguments": {}}))?;
        channel.read_return()?;

        info!("Monitor channel connected to {}", addr);
        Ok(channel)
    }

    fn send(&mut self, message: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.stream
            .write_all(&line)
            .map_err(|_| Error::Disconnected)?;
        Ok(())
    }

    /// Read one JSON message off the wire.
    fn read_message(&mut self) -> Result<Value> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).map_err(|e| {
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) {
                    Error::Timeout("monitor read".to_string())
                } else {
                    Error::Disconnected
                }
            })?;
            if n == 0 {
                // EOF: the emulator went away.
                return Err(Error::Disconnected);
            }
            if line.trim().is_empty() {
                continue;
            }
            return Ok(serde_json::from_str(line.trim())?);
        }
    }

    /// Read messages until a command reply shows up, skipping asynchronous
    /// event notifications.
    fn read_return(&mut self) -> Result<Value> {
        loop {
            let message = self.read_message()?;
            if let Some(err) = message.get("error") {
                return Err(Error::Protocol(err.to_string()));
            }
            if let Some(ret) = message.get("return") {
                return Ok(ret.clone());
            }
            if message.get("event").is_some() {
                debug!("Skipping monitor event: {}", message);
                continue;
            }
            return Err(Error::Protocol(format!(
                "unexpected monitor message: {}",
                message
            )));
        }
    }

    fn run(&mut self, message: Value) -> Result<Value> {
        self.send(&message)?;
        self.read_return()
    }
}

impl Monitor for QmpChannel {
    fn execute(&mut self, command: &str) -> Result<Value> {
        self.run(json!({"execute": command, "arguments": {}}))
    }

    fn hmp(&mut self, command: &str) -> Result<String> {
        let reply = self.run(json!({
            "execute": "human-monitor-command",
            "arguments": {"command-line": command},
        }))?;
        match reply.as_str() {
            Some(text) => Ok(text.replace('\r', "")),
            None => Err(Error::Protocol(format!(
                "non-text reply to '{}': {}",
                command, reply
            ))),
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        warn!("Reconnecting monitor channel");
        *self = Self::connect(&self.config)?;
        Ok(())
    }
}
