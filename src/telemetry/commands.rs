use log::info;

use crate::FuelCalcError;

/// Receives the commands the fuel estimator sends back to the simulator.
pub trait PitCommandSink {
    /// Set the fuel the pit crew will add at the next stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be delivered. Failures are not retried.
    fn set_pit_stop_fuel(&mut self, amount: u32) -> Result<(), FuelCalcError>;
}

/// Keeps the commands instead of sending them, used when replaying a recorded session.
#[derive(Debug, Default)]
pub struct RecordingPitCommandSink {
    pub commands: Vec<u32>,
}

impl PitCommandSink for RecordingPitCommandSink {
    fn set_pit_stop_fuel(&mut self, amount: u32) -> Result<(), FuelCalcError> {
        info!("Pit stop fuel set to {amount}");
        self.commands.push(amount);
        Ok(())
    }
}

#[cfg(windows)]
const IRSDK_BROADCAST_PIT_COMMAND: usize = 9;
#[cfg(windows)]
const IRSDK_PIT_COMMAND_FUEL: usize = 2;

/// Sends pit commands through the iRacing broadcast window message.
#[cfg(windows)]
pub struct IRacingPitCommandSink {
    broadcast_msg: u32,
}

#[cfg(windows)]
impl IRacingPitCommandSink {
    pub fn new() -> Result<Self, FuelCalcError> {
        use windows::Win32::UI::WindowsAndMessaging::RegisterWindowMessageW;
        use windows::core::w;

        // SAFETY: the message name is a static NUL terminated wide string.
        let broadcast_msg = unsafe { RegisterWindowMessageW(w!("IRSDK_BROADCASTMSG")) };
        if broadcast_msg == 0 {
            return Err(FuelCalcError::PitCommandError {
                description: "Could not register the iRacing broadcast message".to_string(),
            });
        }
        Ok(Self { broadcast_msg })
    }
}

#[cfg(windows)]
impl PitCommandSink for IRacingPitCommandSink {
    fn set_pit_stop_fuel(&mut self, amount: u32) -> Result<(), FuelCalcError> {
        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{HWND_BROADCAST, SendNotifyMessageW};

        // the command goes in the low word, its argument in the high word
        let wparam = WPARAM(IRSDK_BROADCAST_PIT_COMMAND | (IRSDK_PIT_COMMAND_FUEL << 16));
        let lparam = LPARAM(amount as isize);

        // SAFETY: plain message post, no pointers are passed.
        unsafe { SendNotifyMessageW(HWND_BROADCAST, self.broadcast_msg, wparam, lparam) }.map_err(
            |e| FuelCalcError::PitCommandError {
                description: e.to_string(),
            },
        )?;
        info!("Pit stop fuel set to {amount}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_commands() {
        let mut sink = RecordingPitCommandSink::default();
        sink.set_pit_stop_fuel(18).unwrap();
        sink.set_pit_stop_fuel(0).unwrap();
        assert_eq!(sink.commands, vec![18, 0]);
    }
}
