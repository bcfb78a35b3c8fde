pub mod config;

use std::{
    io::{self, BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
    },
    thread::{self, JoinHandle},
};

use log::warn;

use crate::fuel::FuelReport;
use crate::telemetry::UserCommand;

pub const HELP: &str = "Commands: [a] toggle AutoFuel, [g] toggle green flag laps only, \
[+]/[-] lap offset, [m <value>] fuel multiplier, [r] reset session, [q] quit";

/// Parses one line typed by the user.
pub fn parse_command(line: &str) -> Option<UserCommand> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "a" | "auto" => UserCommand::ToggleAutoFuel,
        "g" | "green" => UserCommand::ToggleGreenFlagOnly,
        "+" => UserCommand::AdjustLapOffset(1),
        "-" => UserCommand::AdjustLapOffset(-1),
        "m" | "mult" => UserCommand::SetFuelMultiplier(parts.next()?.parse().ok()?),
        "r" | "reset" => UserCommand::ResetSession,
        "q" | "quit" | "exit" => UserCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Handles Ctrl-C. Returns true when the process should exit right away, which is the case
/// while the collector is still waiting for the simulator or after it has gone.
pub fn request_quit(collecting: &AtomicBool, command_sender: &Sender<UserCommand>) -> bool {
    if !collecting.load(Ordering::SeqCst) {
        return true;
    }
    command_sender.send(UserCommand::Quit).is_err()
}

/// Reads commands from stdin and forwards them to the collector. Stops at end of input
/// or when the collector is gone.
pub fn spawn_command_reader(command_sender: Sender<UserCommand>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if command_sender.send(command).is_err() {
                        break;
                    }
                }
                None => println!("{HELP}"),
            }
        }
    })
}

/// Prints every report it receives until the collector hangs up.
pub fn spawn_report_printer(report_receiver: Receiver<FuelReport>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut stdout = io::stdout();
        for report in report_receiver {
            if let Err(e) = writeln!(stdout, "\n{report}").and_then(|_| stdout.flush()) {
                warn!("Could not print fuel report: {e}");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("a"), Some(UserCommand::ToggleAutoFuel));
        assert_eq!(parse_command(" g "), Some(UserCommand::ToggleGreenFlagOnly));
        assert_eq!(parse_command("+"), Some(UserCommand::AdjustLapOffset(1)));
        assert_eq!(parse_command("-"), Some(UserCommand::AdjustLapOffset(-1)));
        assert_eq!(
            parse_command("m 1.05"),
            Some(UserCommand::SetFuelMultiplier(1.05))
        );
        assert_eq!(parse_command("r"), Some(UserCommand::ResetSession));
        assert_eq!(parse_command("quit"), Some(UserCommand::Quit));
    }

    #[test]
    fn test_request_quit() {
        let (tx, rx) = std::sync::mpsc::channel();
        let collecting = AtomicBool::new(false);
        assert!(request_quit(&collecting, &tx));
        assert!(rx.try_recv().is_err());

        collecting.store(true, Ordering::SeqCst);
        assert!(!request_quit(&collecting, &tx));
        assert_eq!(rx.try_recv(), Ok(UserCommand::Quit));

        drop(rx);
        assert!(request_quit(&collecting, &tx));
    }

    #[test]
    fn test_parse_invalid_command() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("m"), None);
        assert_eq!(parse_command("m lots"), None);
        assert_eq!(parse_command("fuel"), None);
    }
}
