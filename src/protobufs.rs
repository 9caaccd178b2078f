//! The handful of protobuf schemas the session layer reads itself.
//!
//! Everything else travels as opaque bodies and is decoded by the caller.
//! Field numbers follow the upstream `steammessages_*.proto` definitions.

/// Header carried by every protobuf-flagged message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgProtoBufHeader {
    #[prost(fixed64, optional, tag = "1")]
    pub steamid: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub client_sessionid: Option<i32>,
    #[prost(uint32, optional, tag = "3")]
    pub routing_appid: Option<u32>,
    #[prost(fixed64, optional, tag = "10", default = "18446744073709551615")]
    pub jobid_source: Option<u64>,
    #[prost(fixed64, optional, tag = "11", default = "18446744073709551615")]
    pub jobid_target: Option<u64>,
    #[prost(string, optional, tag = "12")]
    pub target_job_name: Option<String>,
    #[prost(int32, optional, tag = "13", default = "2")]
    pub eresult: Option<i32>,
    #[prost(string, optional, tag = "14")]
    pub error_message: Option<String>,
}

/// Batch of length-prefixed sub-messages, optionally gzip-compressed.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgMulti {
    #[prost(uint32, optional, tag = "1")]
    pub size_unzipped: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message_body: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLogonResponse {
    #[prost(int32, optional, tag = "1", default = "2")]
    pub eresult: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub out_of_game_heartbeat_seconds: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub in_game_heartbeat_seconds: Option<i32>,
    #[prost(uint32, optional, tag = "4")]
    pub public_ip: Option<u32>,
    #[prost(fixed32, optional, tag = "5")]
    pub rtime32_server_time: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub account_flags: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub cell_id: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLoggedOff {
    #[prost(int32, optional, tag = "1", default = "2")]
    pub eresult: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientServerList {
    #[prost(message, repeated, tag = "1")]
    pub servers: Vec<cmsg_client_server_list::Server>,
}

pub mod cmsg_client_server_list {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Server {
        #[prost(uint32, optional, tag = "1")]
        pub server_type: Option<u32>,
        #[prost(uint32, optional, tag = "2")]
        pub server_ip: Option<u32>,
        #[prost(uint32, optional, tag = "3")]
        pub server_port: Option<u32>,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientCMList {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub cm_addresses: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "2")]
    pub cm_ports: Vec<u32>,
    #[prost(string, repeated, tag = "3")]
    pub cm_websocket_addresses: Vec<String>,
    #[prost(uint32, optional, tag = "4")]
    pub percent_default_to_websocket: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientSessionToken {
    #[prost(uint64, optional, tag = "1")]
    pub token: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientHeartBeat {
    #[prost(bool, optional, tag = "1")]
    pub send_reply: Option<bool>,
}
