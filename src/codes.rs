// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

//! TPI command and event code tables.
//!
//! Every message on the wire starts with a 3-digit decimal code. Codes the
//! client sends live in [`ClientCode`], codes the panel sends in [`ServerCode`].
//! A [`CodeRegistry`] gives O(1) lookup by name and by numeric value and is
//! validated once at construction.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::RegistryError;

/// Largest value that fits the 3-digit code field.
pub const MAX_CODE_VALUE: u16 = 999;

/// A named, numbered entry in one of the TPI code tables.
pub trait Code: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Table name used in diagnostics.
    const TABLE: &'static str;
    /// Every code in the table, in declaration order.
    const ALL: &'static [Self];

    fn name(self) -> &'static str;
    fn value(self) -> u16;
    fn description(self) -> &'static str;
}

macro_rules! code_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $ty:ident in $table:literal {
            $( $variant:ident = $value:literal => $desc:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $ty {
            $(
                #[doc = $desc]
                $variant,
            )+
        }

        impl Code for $ty {
            const TABLE: &'static str = $table;
            const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant), )+
                }
            }

            fn value(self) -> u16 {
                match self {
                    $( Self::$variant => $value, )+
                }
            }

            fn description(self) -> &'static str {
                match self {
                    $( Self::$variant => $desc, )+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

code_table! {
    /// Commands sent by the client to the Envisalink.
    pub enum ClientCode in "client" {
        Poll = 0 => "Poll",
        StatusReport = 1 => "Status Report",
        NetworkLogin = 5 => "Network Login",
        DumpZoneTimers = 8 => "Dump Zone Timers",
        SetTimeAndDate = 10 => "Set Time and Date",
        CommandOutputControl = 20 => "Command Output Control",
        PartitionArmAway = 30 => "Partition Arm Control - Away",
        PartitionArmStay = 31 => "Partition Arm Control - Stay",
        PartitionArmZeroEntryDelay = 32 => "Partition Arm Control - Zero Entry Delay",
        PartitionArmWithCode = 33 => "Partition Arm Control - With Code",
        PartitionDisarm = 40 => "Partition Disarm Control",
        TimeStampControl = 55 => "Time Stamp Control",
        TimeBroadcastControl = 56 => "Time Broadcast Control",
        TemperatureBroadcastControl = 57 => "Temperature Broadcast Control",
        TriggerPanicAlarm = 60 => "Trigger Panic Alarm",
        SendKeystrokeString = 71 => "Send Keystroke String",
        EnterUserCodeProgramming = 72 => "Enter User Code Programming",
        EnterUserProgramming = 73 => "Enter User Programming",
        KeepAlive = 74 => "Keep Alive",
        CodeSend = 200 => "Code Send",
    }
}

code_table! {
    /// Responses and events sent by the Envisalink to the client.
    pub enum ServerCode in "server" {
        Ack = 500 => "Command Acknowledge",
        CommandError = 501 => "Command Error",
        SystemError = 502 => "System Error",
        LoginRes = 505 => "Login Interaction",
        KeypadLedState = 510 => "Keypad LED State - Partition 1 Only",
        KeypadLedFlashState = 511 => "Keypad LED FLASH State - Partition 1 Only",
        SystemTime = 550 => "Time/Date Broadcast",
        RingDetect = 560 => "Ring Detected",
        IndoorTemperature = 561 => "Indoor Temperature Broadcast",
        OutdoorTemperature = 562 => "Outdoor Temperature Broadcast",
        ZoneAlarm = 601 => "Zone Alarm",
        ZoneAlarmRestore = 602 => "Zone Alarm Restore",
        ZoneTamper = 603 => "Zone Tamper",
        ZoneTamperRestore = 604 => "Zone Tamper Restore",
        ZoneFault = 605 => "Zone Fault",
        ZoneFaultRestore = 606 => "Zone Fault Restore",
        ZoneOpen = 609 => "Zone Open",
        ZoneRestore = 610 => "Zone Restored",
        ZoneTimerTick = 615 => "Envisalink Zone Timer Dump",
        DuressAlarm = 620 => "Duress Alarm",
        FireKeyAlarm = 621 => "Fire Key Alarm",
        FireKeyAlarmRestore = 622 => "Fire Key Alarm Restore",
        AuxiliaryKeyAlarm = 623 => "Auxiliary Key Alarm",
        AuxiliaryKeyAlarmRestore = 624 => "Auxiliary Key Alarm Restore",
        PanicKeyAlarm = 625 => "Panic Key Alarm",
        PanicKeyAlarmRestore = 626 => "Panic Key Alarm Restore",
        SmokeOrAuxAlarm = 631 => "2-Wire Smoke/Aux Alarm",
        SmokeOrAuxAlarmRestore = 632 => "2-Wire Smoke/Aux Alarm Restore",
        PartitionReady = 650 => "Partition Ready",
        PartitionNotReady = 651 => "Partition Not Ready",
        PartitionArmed = 652 => "Partition Armed",
        PartitionReadyForceArming = 653 => "Partition Ready - Force Arming Enabled",
        PartitionInAlarm = 654 => "Partition In Alarm",
        PartitionDisarmed = 655 => "Partition Disarmed",
        ExitDelayInProgress = 656 => "Exit Delay in Progress",
        EntryDelayInProgress = 657 => "Entry Delay in Progress",
        KeypadLockOut = 658 => "Keypad Lock-out",
        PartitionArmingFailed = 659 => "Partition Failed to Arm",
        PgmOutputInProgress = 660 => "PGM Output is in Progress",
        ChimeEnabled = 663 => "Chime Enabled",
        ChimeDisabled = 664 => "Chime Disabled",
        InvalidAccessCode = 670 => "Invalid Access Code",
        FunctionNotAvailable = 671 => "Function Not Available",
        ArmingFailed = 672 => "Failure to Arm",
        PartitionBusy = 673 => "Partition is Busy",
        SystemArmingInProgress = 674 => "System Arming in Progress",
        SystemInInstallersMode = 680 => "System in Installers Mode",
        UserClosing = 700 => "User Closing",
        SpecialClosing = 701 => "Special Closing",
        PartialClosing = 702 => "Partial Closing",
        UserOpening = 750 => "User Opening",
        SpecialOpening = 751 => "Special Opening",
        PanelBatteryTrouble = 800 => "Panel Battery Trouble",
        PanelBatteryTroubleRestore = 801 => "Panel Battery Trouble Restore",
        PanelAcTrouble = 802 => "Panel AC Trouble",
        PanelAcRestore = 803 => "Panel AC Restore",
        SystemBellTrouble = 806 => "System Bell Trouble",
        SystemBellTroubleRestore = 807 => "System Bell Trouble Restoral",
        FtcTrouble = 814 => "FTC Trouble",
        BufferNearFull = 816 => "Buffer Near Full",
        GeneralSystemTamper = 829 => "General System Tamper",
        GeneralSystemTamperRestore = 830 => "General System Tamper Restore",
        TroubleLedOn = 840 => "Trouble LED ON",
        TroubleLedOff = 841 => "Trouble LED OFF",
        FireTroubleAlarm = 842 => "Fire Trouble Alarm",
        FireTroubleAlarmRestore = 843 => "Fire Trouble Alarm Restore",
        VerboseTroubleStatus = 849 => "Verbose Trouble Status",
        CodeRequired = 900 => "Code Required",
        CommandOutputPressed = 912 => "Command Output Pressed",
        MasterCodeRequired = 921 => "Master Code Required",
        InstallersCodeRequired = 922 => "Installers Code Required",
    }
}

/// Validated lookup table over one code family.
#[derive(Debug, Clone)]
pub struct CodeRegistry<C: Code> {
    by_name: HashMap<&'static str, C>,
    by_value: HashMap<u16, C>,
}

impl<C: Code> CodeRegistry<C> {
    /// Build the registry for the full table of `C`.
    pub fn new() -> Result<Self, RegistryError> {
        Self::from_codes(C::ALL)
    }

    /// Build a registry from an explicit list, rejecting duplicate names,
    /// duplicate values and values that do not fit three digits.
    pub fn from_codes(codes: &[C]) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::with_capacity(codes.len());
        let mut by_value: HashMap<u16, C> = HashMap::with_capacity(codes.len());

        for &code in codes {
            if code.value() > MAX_CODE_VALUE {
                return Err(RegistryError::ValueOutOfRange {
                    table: C::TABLE,
                    name: code.name(),
                    value: code.value(),
                });
            }
            if by_name.insert(code.name(), code).is_some() {
                return Err(RegistryError::DuplicateName {
                    table: C::TABLE,
                    name: code.name(),
                });
            }
            if let Some(first) = by_value.insert(code.value(), code) {
                return Err(RegistryError::DuplicateValue {
                    table: C::TABLE,
                    value: code.value(),
                    first: first.name(),
                    second: code.name(),
                });
            }
        }

        Ok(Self { by_name, by_value })
    }

    pub fn by_name(&self, name: &str) -> Option<C> {
        self.by_name.get(name).copied()
    }

    pub fn by_value(&self, value: u16) -> Option<C> {
        self.by_value.get(&value).copied()
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }

    /// All registered codes, ordered by numeric value.
    pub fn codes(&self) -> Vec<C> {
        let mut codes: Vec<C> = self.by_value.values().copied().collect();
        codes.sort_by_key(|c| c.value());
        codes
    }
}

/// The client and server registries, built together at startup.
#[derive(Debug, Clone)]
pub struct Registries {
    pub client: CodeRegistry<ClientCode>,
    pub server: CodeRegistry<ServerCode>,
}

impl Registries {
    pub fn new() -> Result<Self, RegistryError> {
        Ok(Self {
            client: CodeRegistry::new()?,
            server: CodeRegistry::new()?,
        })
    }
}
