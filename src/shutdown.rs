//! Termination requests.
//!
//! Both stop paths, the operator's keypress and an asynchronous interrupt,
//! only set a `StopToken`. The session polls the token between iterations and
//! runs the stop sequence itself, so the device is never touched from the
//! interrupt context. The first request wins; later requests are no-ops.

use anyhow::{anyhow, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

const NONE: u8 = 0;
const USER: u8 = 1;
const INTERRUPT: u8 = 2;

/// Exit status for a session ended by an interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Operator asked to stop (keypress sentinel).
    User,
    /// Interrupt signal delivered to the process.
    Interrupt,
}

#[derive(Clone, Debug, Default)]
pub struct StopToken {
    state: Arc<AtomicU8>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stop request. Returns true only for the first request.
    pub fn request(&self, reason: StopReason) -> bool {
        let code = match reason {
            StopReason::User => USER,
            StopReason::Interrupt => INTERRUPT,
        };
        self.state
            .compare_exchange(NONE, code, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) != NONE
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            USER => Some(StopReason::User),
            INTERRUPT => Some(StopReason::Interrupt),
            _ => None,
        }
    }
}

/// Route Ctrl-C / SIGINT into `token`.
pub fn install_interrupt_handler(token: StopToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if token.request(StopReason::Interrupt) {
            log::warn!("interrupt received, stopping device...");
        } else {
            log::debug!("stop already pending, ignoring interrupt");
        }
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))
}

/// True for the lines that mean "stop": `q`, `quit`, or ESC.
pub fn is_stop_key(line: &str) -> bool {
    let trimmed = line.trim_matches(|c: char| c == '\r' || c == '\n' || c == ' ');
    trimmed.eq_ignore_ascii_case("q")
        || trimmed.eq_ignore_ascii_case("quit")
        || trimmed.contains('\u{1b}')
}

/// Watch stdin for the stop key. Other non-empty lines are forwarded.
///
/// End of input ends the watcher without requesting a stop, so a session
/// started with a closed stdin keeps streaming until interrupted.
pub fn spawn_key_watcher(token: StopToken) -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("key-watcher".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if is_stop_key(&line) {
                    if token.request(StopReason::User) {
                        log::info!("stop requested from keyboard");
                    }
                    break;
                }
                let command = line.trim().to_string();
                if !command.is_empty() && tx.send(command).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| anyhow!("failed to spawn key watcher: {}", e))?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_request_wins() {
        let token = StopToken::new();
        assert!(!token.is_requested());
        assert!(token.request(StopReason::User));
        assert!(!token.request(StopReason::Interrupt));
        assert_eq!(token.reason(), Some(StopReason::User));
    }

    #[test]
    fn double_interrupt_is_noop() {
        let token = StopToken::new();
        assert!(token.request(StopReason::Interrupt));
        assert!(!token.request(StopReason::Interrupt));
        assert_eq!(token.reason(), Some(StopReason::Interrupt));
    }

    #[test]
    fn concurrent_requests_have_one_winner() {
        let token = StopToken::new();
        let winners: usize = (0..8)
            .map(|i| {
                let token = token.clone();
                thread::spawn(move || {
                    let reason = if i % 2 == 0 {
                        StopReason::User
                    } else {
                        StopReason::Interrupt
                    };
                    token.request(reason) as usize
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("join"))
            .sum();
        assert_eq!(winners, 1);
        assert!(token.reason().is_some());
    }

    #[test]
    fn stop_keys() {
        assert!(is_stop_key("q\n"));
        assert!(is_stop_key("QUIT"));
        assert!(is_stop_key("\u{1b}"));
        assert!(!is_stop_key("r"));
        assert!(!is_stop_key(""));
    }
}
