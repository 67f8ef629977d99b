// Pathcheck: Path-Integrity Verification for Source-Routed Data Planes
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Utilities for telnet interactions with the network emulator console.
//!
//! The emulator (a Mininet-style process with an attached interactive
//! console) owns the actual virtual network. This driver replays a prepared
//! [`Topology`] into it, starts and stops the network, and injects probe
//! traffic through host shell commands. All commands are synchronous and
//! blocking, paced by the emulator's prompt.

use pathcheck::topology::{Node, Topology};

use log::*;
use regex::Regex;
use telnet::{Telnet, TelnetEvent};

use std::error::Error;
use std::str;
use std::thread::sleep;
use std::time::{Duration, SystemTime};

/// Seconds to wait for the first prompt after connecting.
const CONNECT_WAIT_S: u64 = 20;

/// Seconds to wait for the prompt after a command.
const CMD_WAIT_S: u64 = 10;

/// Connection to the network emulator console.
///
/// This struct does not implement `Copy`, `Sync` or `Send`, since it involves
/// communicating with a stream from the OS.
pub struct EmulatorConsole {
    c: Telnet,
    prompt_re: Regex,
    logging: bool,
}

impl std::fmt::Debug for EmulatorConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EmulatorConsole")
    }
}

impl EmulatorConsole {
    /// Connect to the emulator console on the local machine.
    pub fn connect(port: u16) -> Result<Self, Box<dyn Error>> {
        let prompt_re = Regex::new(r"(?m)(mininet(-wifi)?|containernet)> $").unwrap();

        let mut c = Telnet::connect(("localhost", port), 2048)?;
        // receive all initial events
        while let Ok(event) = c.read_timeout(Duration::from_millis(1)) {
            if matches!(event, TelnetEvent::TimedOut) {
                break;
            }
        }

        c.write("\n".as_bytes())?;

        let now = SystemTime::now();
        let mut result = String::new();
        loop {
            let event = c.read_nonblocking()?;
            match event {
                TelnetEvent::NoData => {
                    if now.elapsed()? > Duration::from_secs(CONNECT_WAIT_S) {
                        error!("Could not reach the emulator console at port: {}", port);
                        return Err("Could not reach the emulator console".into());
                    }
                    sleep(Duration::from_millis(10));
                }
                TelnetEvent::Data(d) => result.push_str(str::from_utf8(&d)?),
                _ => {}
            }
            if prompt_re.is_match(&result) {
                break;
            }
        }

        Ok(Self { c, prompt_re, logging: false })
    }

    /// Echo every console response to stderr.
    pub fn set_logging(&mut self, logging: bool) {
        self.logging = logging;
    }

    /// Replay a prepared topology into the emulator, switch by switch and
    /// link by link. The emulator network must not be started yet.
    pub fn build_topology(&mut self, topology: &Topology) -> Result<(), Box<dyn Error>> {
        for id in topology.switches() {
            if let Node::Switch { name, thrift_port } = topology.node(*id) {
                self.send_wait(format!(
                    "py net.addSwitch('{}', thriftport={})\n",
                    name, thrift_port
                ))?;
            }
        }
        for id in topology.hosts() {
            if let Node::Host { name, ip, mac } = topology.node(*id) {
                self.send_wait(format!(
                    "py net.addHost('{}', ip='{}/24', mac='{}')\n",
                    name,
                    ip,
                    mac.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
                ))?;
            }
        }
        for (a, b, link) in topology.links() {
            self.send_wait(format!(
                "py net.addLink('{}', '{}', port1={}, port2={}, bw={})\n",
                topology.node(a).name(),
                topology.node(b).name(),
                link.port_a,
                link.port_b,
                link.bandwidth
            ))?;
        }
        Ok(())
    }

    /// Start the emulated network and install static ARP entries.
    pub fn start(&mut self) -> Result<(), Box<dyn Error>> {
        info!("starting the emulated network");
        self.send_wait("py net.build()\n")?;
        self.send_wait("py net.start()\n")?;
        self.send_wait("py net.staticArp()\n")?;
        Ok(())
    }

    /// Stop the emulated network.
    pub fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        info!("stopping the emulated network");
        self.send_wait("py net.stop()\n")?;
        Ok(())
    }

    /// Run a shell line on a host, without waiting for its output. Used for
    /// probe injection, where the command runs in the background anyway.
    pub fn host_cmd(&mut self, host: &str, line: impl AsRef<str>) -> Result<(), Box<dyn Error>> {
        debug!("{} {}", host, line.as_ref());
        self.c.write(format!("{} {}\n", host, line.as_ref()).as_bytes())?;
        Ok(())
    }

    fn send_wait(&mut self, data: impl AsRef<str>) -> Result<String, Box<dyn Error>> {
        self.c.write(data.as_ref().as_bytes())?;
        self.receive_until_prompt()
    }

    fn receive_until_prompt(&mut self) -> Result<String, Box<dyn Error>> {
        let mut result = String::new();
        let now = SystemTime::now();
        loop {
            let event = self.c.read_nonblocking()?;
            match event {
                TelnetEvent::NoData => {
                    if now.elapsed()? > Duration::from_secs(CMD_WAIT_S) {
                        return Err(format!(
                            "Took longer than {} seconds to receive an answer!",
                            CMD_WAIT_S
                        )
                        .into());
                    }
                    sleep(Duration::from_millis(10));
                }
                TelnetEvent::Data(d) => {
                    let s = str::from_utf8(&d)?;
                    if self.logging {
                        eprint!("{}", s);
                    }
                    result.push_str(s);
                    if self.prompt_re.is_match(&result) {
                        return Ok(result.replace("\r\n", "\n"));
                    }
                }
                _ => {}
            }
        }
    }
}
