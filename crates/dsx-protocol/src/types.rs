//! Numeric enumerations used on the wire.

use crate::error::ProtocolError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code),+
        }

        impl $name {
            /// Every variant in wire order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Numeric value written to the wire.
            #[must_use]
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Reverse of [`code`](Self::code).
            #[must_use]
            pub const fn from_code(code: u64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl TryFrom<u64> for $name {
            type Error = ProtocolError;

            fn try_from(code: u64) -> Result<Self, Self::Error> {
                Self::from_code(code).ok_or(ProtocolError::UnknownCode {
                    kind: stringify!($name),
                    code,
                })
            }
        }

        impl From<$name> for serde_json::Value {
            fn from(value: $name) -> Self {
                serde_json::Value::from(value.code())
            }
        }
    };
}

wire_enum! {
    /// Discriminant of an instruction object.
    InstructionType {
        Invalid = 0,
        TriggerUpdate = 1,
        RgbUpdate = 2,
        PlayerLed = 3,
        TriggerThreshold = 4,
        MicLed = 5,
        PlayerLedNewRevision = 6,
        ResetToUserSettings = 7,
        HapticFeedback = 20,
        EditAudio = 21,
    }
}

wire_enum! {
    /// Which adaptive trigger an update addresses.
    Trigger {
        Invalid = 0,
        Left = 1,
        Right = 2,
    }
}

wire_enum! {
    /// Adaptive trigger effect presets understood by DSX.
    TriggerMode {
        Normal = 0,
        GameCube = 1,
        VerySoft = 2,
        Soft = 3,
        Hard = 4,
        VeryHard = 5,
        Hardest = 6,
        Rigid = 7,
        VibrateTrigger = 8,
        Choppy = 9,
        Medium = 10,
        /// Pulsing vibration; the strength parameter sets the frequency.
        VibrateTriggerPulse = 11,
        CustomTriggerValue = 12,
        Resistance = 13,
        Bow = 14,
        Galloping = 15,
        SemiAutomaticGun = 16,
        AutomaticGun = 17,
        Machine = 18,
    }
}

wire_enum! {
    /// Operation carried by an `EditAudio` instruction.
    AudioEditKind {
        Pitch = 0,
        Volume = 1,
        Stop = 2,
        StopAll = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_type_codes() {
        assert_eq!(InstructionType::TriggerUpdate.code(), 1);
        assert_eq!(InstructionType::RgbUpdate.code(), 2);
        assert_eq!(InstructionType::HapticFeedback.code(), 20);
        assert_eq!(InstructionType::EditAudio.code(), 21);
        assert_eq!(InstructionType::from_code(8), None);
    }

    #[test]
    fn test_every_code_maps_back() {
        for mode in TriggerMode::ALL {
            assert_eq!(TriggerMode::from_code(u64::from(mode.code())), Some(*mode));
        }
        for kind in InstructionType::ALL {
            assert_eq!(InstructionType::from_code(u64::from(kind.code())), Some(*kind));
        }
        assert_eq!(TriggerMode::ALL.len(), 19);
    }

    #[test]
    fn test_unknown_code_is_an_error() {
        let err = TriggerMode::try_from(19).err();
        assert!(matches!(
            err,
            Some(ProtocolError::UnknownCode {
                kind: "TriggerMode",
                code: 19
            })
        ));
        assert_eq!(AudioEditKind::try_from(2).ok(), Some(AudioEditKind::Stop));
        assert_eq!(Trigger::try_from(1).ok(), Some(Trigger::Left));
    }
}
