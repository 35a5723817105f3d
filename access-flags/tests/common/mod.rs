use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use access_flags::config::Config;
use access_flags::flags::flag_models::FlagRecord;
use access_flags::server::serve_with_stores;
use access_flags::usage::usage_models::UsageEvent;
use access_flags::utils::test_utils::{InMemoryFlagStore, InMemoryUsageStore};

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub flags: Arc<InMemoryFlagStore>,
    pub usage: Arc<InMemoryUsageStore>,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_stores(
        config: Config,
        records: Vec<FlagRecord>,
        events: Vec<UsageEvent>,
    ) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        let flags = Arc::new(InMemoryFlagStore::new(records));
        let usage = Arc::new(InMemoryUsageStore::new(events));
        let flag_store = flags.clone();
        let usage_store = usage.clone();

        tokio::spawn(async move {
            serve_with_stores(config, listener, flag_store, usage_store, async move {
                notify.notified().await
            })
            .await
        });

        ServerHandle {
            addr,
            flags,
            usage,
            shutdown,
        }
    }

    pub async fn post_json<T: Into<reqwest::Body>>(
        &self,
        path: &str,
        body: T,
    ) -> reqwest::Response {
        let client = reqwest::Client::new();
        client
            .post(format!("http://{:?}{}", self.addr, path))
            .body(body)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn send_access_request<T: Into<reqwest::Body>>(&self, body: T) -> reqwest::Response {
        self.post_json("/access", body).await
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("http://{:?}{}", self.addr, path))
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
