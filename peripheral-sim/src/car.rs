//! Simulated car firmware state

use blueremote_shared::RemoteCommand;

pub const MAX_SPEED: u8 = 9;

/// What the car is doing, as driven by received signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarState {
    pub auto: bool,
    pub speed: u8,
    pub motion: RemoteCommand,
}

impl Default for CarState {
    fn default() -> Self {
        Self {
            auto: false,
            speed: 5,
            motion: RemoteCommand::Stop,
        }
    }
}

impl CarState {
    /// Apply one received signal character and return the status line to send back
    pub fn apply(&mut self, signal: char) -> Option<String> {
        if signal.is_whitespace() || signal.is_control() {
            return None;
        }

        let command = RemoteCommand::from_signal(signal);
        let reply = match command {
            RemoteCommand::AutoMode => {
                self.auto = true;
                "AUTO ON".to_string()
            }
            RemoteCommand::ManualMode => {
                self.auto = false;
                "AUTO OFF".to_string()
            }
            RemoteCommand::SpeedUp => {
                self.speed = (self.speed + 1).min(MAX_SPEED);
                format!("SPEED {}", self.speed)
            }
            RemoteCommand::SpeedDown => {
                self.speed = self.speed.saturating_sub(1);
                format!("SPEED {}", self.speed)
            }
            RemoteCommand::Forward
            | RemoteCommand::Backward
            | RemoteCommand::Left
            | RemoteCommand::Right
            | RemoteCommand::Stop => {
                if self.auto {
                    format!("IGNORED {} (auto)", signal)
                } else {
                    self.motion = command;
                    format!("ACK {}", signal)
                }
            }
            RemoteCommand::Custom(c) => format!("ACK {}", c),
        };

        Some(format!("{}\n", reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driving_acks() {
        let mut car = CarState::default();
        assert_eq!(car.apply('F').as_deref(), Some("ACK F\n"));
        assert_eq!(car.motion, RemoteCommand::Forward);
        assert_eq!(car.apply('\n'), None);
    }

    #[test]
    fn test_speed_is_clamped() {
        let mut car = CarState::default();
        for _ in 0..20 {
            car.apply('+');
        }
        assert_eq!(car.speed, MAX_SPEED);

        for _ in 0..20 {
            car.apply('-');
        }
        assert_eq!(car.apply('-').as_deref(), Some("SPEED 0\n"));
    }

    #[test]
    fn test_auto_mode_ignores_driving() {
        let mut car = CarState::default();
        assert_eq!(car.apply('A').as_deref(), Some("AUTO ON\n"));
        assert_eq!(car.apply('L').as_deref(), Some("IGNORED L (auto)\n"));
        assert_eq!(car.motion, RemoteCommand::Stop);

        assert_eq!(car.apply('M').as_deref(), Some("AUTO OFF\n"));
        assert_eq!(car.apply('L').as_deref(), Some("ACK L\n"));
        assert_eq!(car.apply('x').as_deref(), Some("ACK x\n"));
    }
}
