//! Topic tags for the binary UI protocol.
//!
//! Every WebSocket frame starts with a single MessagePack positive integer
//! identifying the topic, followed by an inline payload.

/// Message topic carried as the leading tag of every UI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Topic {
    SendAllData = 1,
    ModifySystemState = 2,
    ModifySystemProps = 3,
    RadarAddAircraft = 4,
    RadarRemoveAircraft = 5,
    RadarUpdateAircraft = 6,
    UserAddAircraft = 7,
    UserRemoveAircraft = 8,
    UserUpdateAircraft = 9,
}

impl Topic {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::SendAllData),
            2 => Some(Self::ModifySystemState),
            3 => Some(Self::ModifySystemProps),
            4 => Some(Self::RadarAddAircraft),
            5 => Some(Self::RadarRemoveAircraft),
            6 => Some(Self::RadarUpdateAircraft),
            7 => Some(Self::UserAddAircraft),
            8 => Some(Self::UserRemoveAircraft),
            9 => Some(Self::UserUpdateAircraft),
            _ => None,
        }
    }

    /// Critical messages survive consumer backpressure; periodic updates and
    /// snapshots may be dropped when a consumer queue fills up.
    pub fn is_critical(self) -> bool {
        !matches!(
            self,
            Self::SendAllData | Self::RadarUpdateAircraft | Self::UserUpdateAircraft
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip() {
        for tag in 1..=9u8 {
            let topic = Topic::from_u8(tag).unwrap();
            assert_eq!(topic as u8, tag);
        }
        assert_eq!(Topic::from_u8(0), None);
        assert_eq!(Topic::from_u8(10), None);
    }

    #[test]
    fn updates_and_snapshots_are_droppable() {
        assert!(!Topic::SendAllData.is_critical());
        assert!(!Topic::RadarUpdateAircraft.is_critical());
        assert!(!Topic::UserUpdateAircraft.is_critical());
        assert!(Topic::RadarAddAircraft.is_critical());
        assert!(Topic::RadarRemoveAircraft.is_critical());
        assert!(Topic::ModifySystemState.is_critical());
    }
}
