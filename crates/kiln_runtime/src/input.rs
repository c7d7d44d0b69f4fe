//! Input for the headless host
//!
//! There is no window, so key presses come from stdin: a reader thread turns
//! each line into a [`Command`] and sends it over a channel that the main
//! loop drains once per frame.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashSet;
use std::ffi::c_int;
use std::io::BufRead;
use std::thread::{self, JoinHandle};

/// A command typed at the host's stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reload the game module
    Reload,
    /// Stop the host
    Quit,
    /// Log host and module status
    Status,
    /// List commands
    Help,
    /// Press and release a key over two update ticks
    Tap(c_int),
}

impl Command {
    /// Parse one input line; `None` for blank or unknown input
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim();
        match word.to_ascii_lowercase().as_str() {
            "" => None,
            "r" | "reload" => Some(Command::Reload),
            "quit" | "exit" => Some(Command::Quit),
            "status" => Some(Command::Status),
            "help" | "?" => Some(Command::Help),
            _ => kiln_abi::keys::from_name(word).map(Command::Tap),
        }
    }
}

/// Usage text for [`Command::Help`]
pub const HELP: &str = "commands: r|reload, status, help, quit|exit; any other key name (q, space, a-z, 0-9, escape, enter) taps that key";

/// Spawn the stdin reader
///
/// The thread ends at EOF or when the receiver is dropped. EOF does not stop
/// the host, so it keeps running with stdin closed.
pub fn spawn_stdin_reader() -> std::io::Result<(Receiver<Command>, JoinHandle<()>)> {
    let (tx, rx) = unbounded();
    let handle = thread::Builder::new()
        .name("kiln-stdin".into())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx))?;
    Ok((rx, handle))
}

/// Forward commands parsed from `reader` until EOF
pub fn read_commands(reader: impl BufRead, tx: &Sender<Command>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        match Command::parse(&line) {
            Some(command) => {
                if tx.send(command).is_err() {
                    return;
                }
            }
            None if !line.trim().is_empty() => log::warn!("Unknown command '{}'", line.trim()),
            None => {}
        }
    }
    log::debug!("stdin closed, no more commands");
}

/// Keyboard and mouse state with per-tick press edges
#[derive(Debug, Default)]
pub struct InputState {
    down: HashSet<c_int>,
    started: HashSet<c_int>,
    ended: HashSet<c_int>,
    /// Taps to apply at the next tick
    queued: Vec<c_int>,
    /// Taps applied last tick, released at the next one
    releasing: Vec<c_int>,
    mouse: (f32, f32),
    mouse_buttons: HashSet<c_int>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a press that lasts exactly one update tick
    pub fn tap(&mut self, key: c_int) {
        self.queued.push(key);
    }

    /// Move to the next update tick
    ///
    /// Clears last tick's edges, releases keys tapped last tick and presses
    /// the queued ones.
    pub fn advance(&mut self) {
        self.started.clear();
        self.ended.clear();

        for key in std::mem::take(&mut self.releasing) {
            if self.down.remove(&key) {
                self.ended.insert(key);
            }
        }

        for key in std::mem::take(&mut self.queued) {
            if self.down.insert(key) {
                self.started.insert(key);
            }
            self.releasing.push(key);
        }
    }

    pub fn is_key_down(&self, key: c_int) -> bool {
        self.down.contains(&key)
    }

    pub fn is_key_start_press(&self, key: c_int) -> bool {
        self.started.contains(&key)
    }

    pub fn is_key_end_press(&self, key: c_int) -> bool {
        self.ended.contains(&key)
    }

    pub fn set_mouse_position(&mut self, x: f32, y: f32) {
        self.mouse = (x, y);
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse
    }

    pub fn set_mouse_button(&mut self, button: c_int, down: bool) {
        if down {
            self.mouse_buttons.insert(button);
        } else {
            self.mouse_buttons.remove(&button);
        }
    }

    pub fn is_mouse_button_down(&self, button: c_int) -> bool {
        self.mouse_buttons.contains(&button)
    }
}
