use std::fmt;

/// Closed status set for heartbeats. All transition logic is defined over
/// these four values; the smallint column on `heartbeats` stores the
/// discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum Status {
    Down = 0,
    Up = 1,
    Pending = 2,
    Maintenance = 3,
}

impl Status {
    pub fn from_i16(value: i16) -> Option<Status> {
        match value {
            0 => Some(Status::Down),
            1 => Some(Status::Up),
            2 => Some(Status::Pending),
            3 => Some(Status::Maintenance),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    /// Swap Up and Down; Pending and Maintenance are unaffected.
    /// Used for upside-down monitors.
    pub fn flip(self) -> Status {
        match self {
            Status::Up => Status::Down,
            Status::Down => Status::Up,
            other => other,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Down => "DOWN",
            Status::Up => "UP",
            Status::Pending => "PENDING",
            Status::Maintenance => "MAINTENANCE",
        };
        write!(f, "{name}")
    }
}

/// Decide whether a beat represents a confirmed status transition.
///
/// The first beat of a monitor is always important. After that only these
/// pairs count:
///
/// UP -> DOWN, DOWN -> UP, PENDING -> DOWN,
/// MAINTENANCE -> UP, MAINTENANCE -> DOWN,
/// DOWN -> MAINTENANCE, UP -> MAINTENANCE.
///
/// Everything else (UP -> PENDING, PENDING -> UP, any self-transition) is
/// sampling detail. DOWN -> PENDING cannot occur: the retry policy never
/// downgrades a beat to PENDING while the previous status is DOWN.
pub fn is_important_beat(is_first_beat: bool, previous: Option<Status>, current: Status) -> bool {
    use Status::*;

    if is_first_beat {
        return true;
    }

    matches!(
        (previous, current),
        (Some(Up), Down)
            | (Some(Down), Up)
            | (Some(Pending), Down)
            | (Some(Maintenance), Up)
            | (Some(Maintenance), Down)
            | (Some(Down), Maintenance)
            | (Some(Up), Maintenance)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    const ALL: [Status; 4] = [Down, Up, Pending, Maintenance];

    #[test]
    fn flip_swaps_up_and_down_only() {
        assert_eq!(Up.flip(), Down);
        assert_eq!(Down.flip(), Up);
        assert_eq!(Pending.flip(), Pending);
        assert_eq!(Maintenance.flip(), Maintenance);
    }

    #[test]
    fn i16_round_trip() {
        for status in ALL {
            assert_eq!(Status::from_i16(status.as_i16()), Some(status));
        }
        assert_eq!(Status::from_i16(42), None);
    }

    #[test]
    fn first_beat_is_always_important() {
        for status in ALL {
            assert!(is_important_beat(true, None, status));
            assert!(is_important_beat(true, Some(Up), status));
        }
    }

    #[test]
    fn importance_truth_table_is_exhaustive() {
        let important = [
            (Up, Down),
            (Down, Up),
            (Pending, Down),
            (Maintenance, Up),
            (Maintenance, Down),
            (Down, Maintenance),
            (Up, Maintenance),
        ];

        for prev in ALL {
            for curr in ALL {
                let expected = important.contains(&(prev, curr));
                assert_eq!(
                    is_important_beat(false, Some(prev), curr),
                    expected,
                    "pair {prev} -> {curr}"
                );
            }
        }
    }

    #[test]
    fn self_transitions_are_not_important() {
        for status in ALL {
            assert!(!is_important_beat(false, Some(status), status));
        }
    }
}
