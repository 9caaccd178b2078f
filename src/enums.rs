//! Protocol enumerations shared by the framer, the client and callbacks.
//!
//! Only the values the session layer itself inspects are named. Unknown
//! codes never fail to convert: they collapse onto each enum's `Invalid`
//! variant (or are preserved in `Other` where the raw value still matters).

/// Flag bit marking a message whose body uses the protobuf header.
pub const PROTO_MASK: u32 = 0x8000_0000;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty, fallback = $fallback:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Map a raw wire value onto a variant, falling back for unknown codes.
            #[must_use]
            pub fn from_code(code: $repr) -> Self {
                match code {
                    $($value => Self::$variant,)+
                    _ => Self::$fallback,
                }
            }

            /// Return the raw wire value.
            #[must_use]
            pub fn code(self) -> $repr {
                match self {
                    $(Self::$variant => $value,)+
                }
            }
        }
    };
}

wire_enum! {
    /// Message kinds understood by the session layer.
    EMsg: u32, fallback = Invalid {
        Invalid = 0,
        Multi = 1,
        ServiceMethod = 146,
        ServiceMethodResponse = 147,
        ServiceMethodCallFromClient = 151,
        ServiceMethodSendToClient = 152,
        ClientHeartBeat = 703,
        ClientLogOff = 706,
        ClientLogOnResponse = 751,
        ClientLoggedOff = 757,
        ClientCMList = 783,
        ClientSessionToken = 850,
        ClientServerList = 880,
        ChannelEncryptRequest = 1303,
        ChannelEncryptResponse = 1304,
        ChannelEncryptResult = 1305,
        ClientLogon = 5514,
        ClientHello = 9805,
    }
}

impl EMsg {
    /// Decode the kind from a raw code, ignoring the protobuf flag.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self { Self::from_code(raw & !PROTO_MASK) }

    /// Returns `true` for the channel handshake kinds, which always use the
    /// basic fixed header.
    #[must_use]
    pub fn is_channel_handshake(self) -> bool {
        matches!(
            self,
            Self::ChannelEncryptRequest | Self::ChannelEncryptResponse | Self::ChannelEncryptResult
        )
    }
}

/// Returns `true` when the raw message code carries the protobuf flag.
#[must_use]
pub fn is_proto(raw: u32) -> bool { raw & PROTO_MASK != 0 }

/// Build the raw wire code for `msg`, setting the protobuf flag if requested.
#[must_use]
pub fn make_msg(msg: EMsg, proto: bool) -> u32 {
    if proto { msg.code() | PROTO_MASK } else { msg.code() }
}

wire_enum! {
    /// Result codes carried by logon, logoff and handshake messages.
    EResult: i32, fallback = Invalid {
        Invalid = 0,
        OK = 1,
        Fail = 2,
        NoConnection = 3,
        InvalidPassword = 5,
        LoggedInElsewhere = 6,
        InvalidProtocolVer = 7,
        InvalidParam = 8,
        Busy = 10,
        InvalidState = 11,
        AccessDenied = 15,
        Timeout = 16,
        Banned = 17,
        AccountNotFound = 18,
        ServiceUnavailable = 20,
        NotLoggedOn = 21,
        Pending = 22,
        EncryptionFailure = 23,
        Revoked = 26,
        Expired = 27,
        LogonSessionReplaced = 34,
        ConnectFailed = 35,
        HandshakeFailed = 36,
        TryAnotherCM = 48,
        AccountLogonDenied = 63,
        RateLimitExceeded = 84,
    }
}

wire_enum! {
    /// Deployment environment a client talks to.
    EUniverse: u32, fallback = Invalid {
        Invalid = 0,
        Public = 1,
        Beta = 2,
        Internal = 3,
        Dev = 4,
    }
}

impl Default for EUniverse {
    fn default() -> Self { Self::Public }
}

/// Server role announced in `ClientServerList` messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServerType {
    /// Connection manager.
    Cm,
    /// Account manager.
    Am,
    /// Content server.
    Cs,
    /// Game coordinator.
    Gc,
    /// Product information and change server.
    Pics,
    /// Any role not named above.
    Other(u32),
}

impl ServerType {
    /// Map a raw server type onto a variant.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            3 => Self::Am,
            7 => Self::Cm,
            14 => Self::Pics,
            15 => Self::Cs,
            18 => Self::Gc,
            other => Self::Other(other),
        }
    }

    /// Return the raw wire value.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Am => 3,
            Self::Cm => 7,
            Self::Pics => 14,
            Self::Cs => 15,
            Self::Gc => 18,
            Self::Other(code) => code,
        }
    }
}
