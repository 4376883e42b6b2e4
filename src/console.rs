//! Interactive console host
//!
//! A small line-oriented console that drives the communication core:
//! connect, load a job, print/pause/resume/cancel, and inject ad-hoc
//! commands on either the main or the priority path. Printer traffic is
//! echoed through a registered event handler.

use std::io::{BufRead, Write};
use std::sync::Arc;

use printkit_communication::PrintCore;
use printkit_core::{GCode, PrinterEventHandler};

use crate::config::Config;

/// Echoes printer traffic and lifecycle transitions to the terminal.
struct EchoHandler;

impl PrinterEventHandler for EchoHandler {
    fn on_online(&self) {
        println!("Printer is now online.");
    }

    fn on_recv(&self, line: &str) {
        println!("< {line}");
    }

    fn on_temp(&self, line: &str) {
        println!("[temp] {line}");
    }

    fn on_error(&self, error: &str) {
        eprintln!("! {error}");
    }

    fn on_start(&self, resume: bool) {
        if resume {
            println!("Print resumed.");
        } else {
            println!("Print started.");
        }
    }

    fn on_end(&self) {
        println!("Print ended.");
    }

    fn on_disconnect(&self) {
        println!("Disconnected.");
    }
}

/// The console session: one core, one loaded job.
pub struct Console {
    core: PrintCore,
    config: Config,
    job: Option<GCode>,
    job_name: Option<String>,
}

impl Console {
    pub fn new(config: Config) -> Self {
        let core = PrintCore::new();
        core.add_event_handler(Arc::new(EchoHandler));
        Self {
            core,
            config,
            job: None,
            job_name: None,
        }
    }

    /// Run the read-eval loop until `quit` or end of input.
    pub fn run(&mut self) -> anyhow::Result<()> {
        println!(
            "printkit {} ({}) - type 'help' for commands",
            crate::VERSION,
            crate::BUILD_DATE
        );

        let stdin = std::io::stdin();
        loop {
            print!("PK> ");
            std::io::stdout().flush()?;

            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                break; // EOF
            }
            let input = input.trim();
            if input.is_empty() {
                continue;
            }
            let (command, rest) = match input.split_once(char::is_whitespace) {
                Some((c, r)) => (c, r.trim()),
                None => (input, ""),
            };

            let result = match command {
                "help" => {
                    self.print_help();
                    Ok(())
                }
                "connect" => self.cmd_connect(rest),
                "disconnect" => {
                    self.core.disconnect();
                    Ok(())
                }
                "load" => self.cmd_load(rest),
                "print" => self.cmd_print(),
                "pause" => {
                    if !self.core.pause() {
                        println!("Not printing.");
                    }
                    Ok(())
                }
                "resume" => {
                    if !self.core.resume() {
                        println!("No paused print.");
                    }
                    Ok(())
                }
                "cancel" => {
                    self.core.cancelprint();
                    Ok(())
                }
                "send" => self.core.send(rest).map_err(Into::into),
                "now" => self.core.send_now(rest).map_err(Into::into),
                "status" => {
                    self.cmd_status();
                    Ok(())
                }
                "log" => {
                    for line in self.core.log_lines() {
                        println!("{line}");
                    }
                    Ok(())
                }
                "reset" => self.core.reset().map_err(Into::into),
                "quit" | "exit" => break,
                unknown => {
                    println!("Unknown command '{unknown}'; type 'help'.");
                    Ok(())
                }
            };
            if let Err(e) = result {
                eprintln!("error: {e:#}");
            }
        }

        self.core.disconnect();
        Ok(())
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  connect [LOCATION [BAUD]]  open the printer connection");
        println!("  disconnect                 close it");
        println!("  load FILE                  load a G-code job");
        println!("  print                      start printing the loaded job");
        println!("  pause / resume / cancel    control an ongoing print");
        println!("  send CMD                   queue a command on the main path");
        println!("  now CMD                    send a priority command");
        println!("  status                     connection and job state");
        println!("  log                        dump the receive log");
        println!("  reset                      hardware-reset the printer");
        println!("  quit                       leave");
    }

    fn cmd_connect(&mut self, rest: &str) -> anyhow::Result<()> {
        let mut words = rest.split_whitespace();
        if let Some(location) = words.next() {
            self.config.connection.location = location.to_string();
        }
        if let Some(baud) = words.next() {
            self.config.connection.baud = baud.parse()?;
        }
        self.config.validate()?;

        let endpoint = self.config.endpoint();
        println!("Connecting to {}...", endpoint.location());
        self.core.connect(&endpoint)?;
        Ok(())
    }

    fn cmd_load(&mut self, rest: &str) -> anyhow::Result<()> {
        if rest.is_empty() {
            anyhow::bail!("usage: load FILE");
        }
        let text = std::fs::read_to_string(rest)?;
        let gcode = GCode::from_text(&text);
        let bbox = gcode.bounding_box();
        println!(
            "Loaded {}: {} lines, {} layers, {:.2} mm filament",
            rest,
            gcode.len(),
            gcode.num_layers(),
            gcode.filament_length()
        );
        println!(
            "Extents: X {:.2}..{:.2}  Y {:.2}..{:.2}  Z {:.2}..{:.2}",
            bbox.xmin, bbox.xmax, bbox.ymin, bbox.ymax, bbox.zmin, bbox.zmax
        );
        self.job = Some(gcode);
        self.job_name = Some(rest.to_string());
        Ok(())
    }

    fn cmd_print(&mut self) -> anyhow::Result<()> {
        let Some(job) = self.job.clone() else {
            anyhow::bail!("no job loaded; use 'load FILE' first");
        };
        if !self.core.startprint(job, 0)? {
            println!("Cannot start: not online, already printing, or empty job.");
        }
        Ok(())
    }

    fn cmd_status(&self) {
        println!(
            "connected: {}  online: {}  printing: {}  paused: {}",
            self.core.is_connected(),
            self.core.is_online(),
            self.core.is_printing(),
            self.core.is_paused()
        );
        if let Some(name) = &self.job_name {
            let position = self.core.queue_position();
            let length = self.core.queue_length();
            if length > 0 {
                println!(
                    "job: {} ({}/{} lines, {:.1}%)",
                    name,
                    position,
                    length,
                    100.0 * position as f64 / length as f64
                );
            } else {
                println!("job: {name} (not started)");
            }
        }
    }
}
