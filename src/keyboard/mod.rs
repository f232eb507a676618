//! Local keyboard control for bench testing
//!
//! `1`..`8` pulse that relay, `a` pulses all of them, `q` quits. The terminal
//! is switched to unbuffered input without echo for as long as the
//! [`KeyboardHandle`] lives and is restored when it is dropped or the
//! process panics.

use std::io::{IsTerminal, Read};
use std::os::fd::AsFd;
use std::sync::Mutex;
use std::time::Duration;

use nix::sys::termios::{
    tcgetattr, tcsetattr, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CTRL_D: u8 = 0x04;

// Reads return after this many tenths of a second without input
const READ_TIMEOUT_DECISECONDS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    /// Raw channel number as typed; may be out of range
    Pulse(u8),
    PulseAll,
    Quit,
}

impl KeyCommand {
    pub fn from_byte(key: u8) -> Option<Self> {
        match key {
            b'0'..=b'9' => Some(KeyCommand::Pulse(key - b'0')),
            b'a' | b'A' => Some(KeyCommand::PulseAll),
            b'q' | b'Q' | CTRL_D => Some(KeyCommand::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyboardError {
    #[error("Standard input is not a terminal")]
    NotATerminal,

    #[error("Failed to change terminal settings: {0}")]
    Termios(#[from] nix::errno::Errno),

    #[error("Failed to spawn keyboard thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Unbuffered, silent terminal input. The previous settings come back on drop.
pub struct TerminalGuard {
    original: Termios,
}

impl TerminalGuard {
    pub fn acquire() -> Result<Self, KeyboardError> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Err(KeyboardError::NotATerminal);
        }

        let original = tcgetattr(stdin.as_fd())?;
        let mut unbuffered = original.clone();
        unbuffered
            .local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO);
        unbuffered.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        unbuffered.control_chars[SpecialCharacterIndices::VTIME as usize] =
            READ_TIMEOUT_DECISECONDS;
        tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &unbuffered)?;
        debug!("Terminal switched to unbuffered input");

        install_restore_on_panic(original.clone());
        Ok(Self { original })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore(&self.original);
        debug!("Terminal settings restored");
    }
}

fn restore(original: &Termios) {
    if let Err(e) = tcsetattr(std::io::stdin().as_fd(), SetArg::TCSANOW, original) {
        warn!("Failed to restore terminal settings: {}", e);
    }
}

// Chains onto the hook color_eyre installed
fn install_restore_on_panic(original: Termios) {
    let original = Mutex::new(original);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Ok(original) = original.lock() {
            restore(&original);
        }
        previous(info);
    }));
}

pub struct KeyboardHandle {
    stop: CancellationToken,
    done: oneshot::Receiver<()>,
    _terminal: TerminalGuard,
}

impl KeyboardHandle {
    pub fn spawn(commands: mpsc::UnboundedSender<KeyCommand>) -> Result<Self, KeyboardError> {
        let terminal = TerminalGuard::acquire()?;
        let stop = CancellationToken::new();
        let (done_sender, done) = oneshot::channel();

        let thread_stop = stop.clone();
        std::thread::Builder::new()
            .name("keyboard".to_string())
            .spawn(move || {
                read_keys(&commands, &thread_stop);
                let _ = done_sender.send(());
            })?;

        info!("Send the relay number to pulse it, a to pulse all, or q to quit.");
        Ok(Self {
            stop,
            done,
            _terminal: terminal,
        })
    }

    /// Stops the reader thread and restores the terminal
    pub async fn shutdown(self, timeout: Duration) {
        self.stop.cancel();
        if tokio::time::timeout(timeout, self.done).await.is_err() {
            warn!("Keyboard reader did not stop within {:?}", timeout);
        }
    }
}

fn read_keys(commands: &mpsc::UnboundedSender<KeyCommand>, stop: &CancellationToken) {
    let mut stdin = std::io::stdin().lock();
    let mut key = [0u8; 1];

    while !stop.is_cancelled() {
        match stdin.read(&mut key) {
            // Read timed out
            Ok(0) => continue,
            Ok(_) => {
                let Some(command) = KeyCommand::from_byte(key[0]) else {
                    continue;
                };
                debug!("Key {:?} -> {:?}", key[0] as char, command);
                if commands.send(command).is_err() || command == KeyCommand::Quit {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Failed to read from the keyboard: {}", e);
                break;
            }
        }
    }
    debug!("Keyboard reader finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_pulse_their_channel() {
        assert_eq!(KeyCommand::from_byte(b'1'), Some(KeyCommand::Pulse(1)));
        assert_eq!(KeyCommand::from_byte(b'8'), Some(KeyCommand::Pulse(8)));
        assert_eq!(KeyCommand::from_byte(b'9'), Some(KeyCommand::Pulse(9)));
    }

    #[test]
    fn letters_are_case_insensitive() {
        assert_eq!(KeyCommand::from_byte(b'a'), Some(KeyCommand::PulseAll));
        assert_eq!(KeyCommand::from_byte(b'A'), Some(KeyCommand::PulseAll));
        assert_eq!(KeyCommand::from_byte(b'q'), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_byte(b'Q'), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_byte(CTRL_D), Some(KeyCommand::Quit));
    }

    #[test]
    fn other_keys_are_ignored() {
        assert_eq!(KeyCommand::from_byte(b'x'), None);
        assert_eq!(KeyCommand::from_byte(b' '), None);
        assert_eq!(KeyCommand::from_byte(b'\n'), None);
    }
}
