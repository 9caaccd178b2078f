//! Shared harness for client integration tests.
#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{net::SocketAddr, sync::Arc};

use steamframe::{
    client::{ClientConfig, ClientHandler, CmClient},
    discovery::ServerRecord,
};
use steamframe_testing::{MockConnection, MockConnectionFactory, MockServerList};

pub const STEAM_ID: u64 = 76_561_197_960_278_073;

pub fn addr(last: u8) -> SocketAddr { SocketAddr::from(([10, 0, 0, last], 27017)) }

pub fn record(last: u8) -> ServerRecord { ServerRecord::socket_server(addr(last)) }

/// A client wired to mock collaborators.
pub struct Harness<H: ClientHandler> {
    pub client: CmClient<H>,
    pub factory: Arc<MockConnectionFactory>,
    pub servers: Arc<MockServerList>,
}

impl<H: ClientHandler> Harness<H> {
    pub fn new(handler: H) -> Self { Self::with_records(handler, vec![record(1), record(2)]) }

    pub fn with_records(handler: H, records: Vec<ServerRecord>) -> Self {
        let factory = Arc::new(MockConnectionFactory::new());
        let servers = Arc::new(MockServerList::new(records));
        let config = ClientConfig::builder()
            .connection_factory(factory.clone())
            .server_list(servers.clone())
            .build()
            .expect("valid config");
        Self {
            client: CmClient::new(config, handler),
            factory,
            servers,
        }
    }

    /// Connect to the first candidate and report the channel ready.
    pub fn connected(self) -> Self {
        self.client.connect(None);
        self.transport().emit_connected();
        self
    }

    pub fn transport(&self) -> MockConnection { self.factory.last().expect("a transport was created") }
}
